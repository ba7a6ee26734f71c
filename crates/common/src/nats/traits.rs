use anyhow::Result;
use async_nats::jetstream;
use async_trait::async_trait;

/// Trait for JetStream consumer operations
/// Abstracts the operations needed to create and use a NATS JetStream consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamConsumer: Send + Sync {
    /// Create a durable pull consumer on a stream
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>>;
}

/// A fetched message, detached from its acknowledgement handle
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub subject: String,
    pub payload: bytes::Bytes,
}

/// Acknowledgement outcome for one fetched message
#[derive(Debug, Clone, PartialEq)]
pub enum AckDecision {
    Ack,
    /// Reject for redelivery, with an optional reason for the logs
    Nak(Option<String>),
}

/// A message ready for processing plus the handle used to settle it
pub struct FetchedMessage {
    pub message: InboundMessage,
    pub acker: Box<dyn MessageAcker>,
}

/// Settles a single fetched message with the broker
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageAcker: Send + Sync {
    async fn settle(&self, decision: AckDecision) -> Result<()>;
}

/// Trait for pull consumer operations
/// Abstracts the fetch operation on a pull consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PullConsumer: Send + Sync {
    /// Fetch messages from the consumer
    /// Returns a batch of messages up to max_messages, waiting up to expires duration
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: std::time::Duration,
    ) -> Result<Vec<FetchedMessage>>;
}
