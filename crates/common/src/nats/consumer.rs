use crate::nats::traits::{AckDecision, InboundMessage, JetStreamConsumer, PullConsumer};
use anyhow::Result;
use async_nats::jetstream;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of processing a batch of messages
/// Provides fine-grained control over which messages to acknowledge vs reject
#[derive(Debug, Default, PartialEq)]
pub struct ProcessingResult {
    /// Messages that were successfully processed and should be acknowledged (Ack)
    pub ack: Vec<usize>,
    /// Messages that failed processing and should be rejected (Nak) with optional error details
    pub nak: Vec<(usize, Option<String>)>,
}

impl ProcessingResult {
    /// Create a result where all messages should be acknowledged
    pub fn ack_all(count: usize) -> Self {
        Self {
            ack: (0..count).collect(),
            nak: Vec::new(),
        }
    }

    /// Create a result where all messages should be rejected
    pub fn nak_all(count: usize, error: Option<String>) -> Self {
        Self {
            ack: Vec::new(),
            nak: (0..count).map(|i| (i, error.clone())).collect(),
        }
    }

    /// Decision for the message at `idx`; indices the processor did not mention are acked
    fn decision_for(&self, idx: usize) -> AckDecision {
        match self.nak.iter().find(|(i, _)| *i == idx) {
            Some((_, reason)) => AckDecision::Nak(reason.clone()),
            None => AckDecision::Ack,
        }
    }
}

/// Batch processor: receives detached message copies and decides how each is settled
pub type BatchProcessor =
    Box<dyn Fn(Vec<InboundMessage>) -> BoxFuture<'static, Result<ProcessingResult>> + Send + Sync>;

/// Settings for a durable pull consumer
#[derive(Debug, Clone)]
pub struct NatsConsumerConfig {
    pub stream_name: String,
    pub consumer_name: String,
    pub subject_filter: String,
    pub batch_size: usize,
    pub max_wait: Duration,
}

/// Generic NATS JetStream consumer that processes batches of messages
/// Fetching and acknowledgement live here; deserialization and business logic
/// are delegated to the processor function
pub struct NatsConsumer {
    consumer: Box<dyn PullConsumer>,
    batch_size: usize,
    max_wait: Duration,
    processor: BatchProcessor,
}

impl NatsConsumer {
    pub async fn new(
        client: Arc<dyn JetStreamConsumer>,
        config: NatsConsumerConfig,
        processor: BatchProcessor,
    ) -> Result<Self> {
        debug!(
            stream = %config.stream_name,
            consumer = %config.consumer_name,
            subject = %config.subject_filter,
            "Creating JetStream consumer"
        );

        let consumer = client
            .create_consumer(
                jetstream::consumer::pull::Config {
                    name: Some(config.consumer_name.clone()),
                    durable_name: Some(config.consumer_name.clone()),
                    filter_subject: config.subject_filter.clone(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
                &config.stream_name,
            )
            .await?;

        info!(
            stream = %config.stream_name,
            consumer = %config.consumer_name,
            "Consumer created successfully"
        );

        Ok(Self {
            consumer,
            batch_size: config.batch_size,
            max_wait: config.max_wait,
            processor,
        })
    }

    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        info!("Starting consumer loop");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("Received shutdown signal, stopping consumer");
                    break;
                }
                result = self.fetch_and_process_batch() => {
                    if let Err(e) = result {
                        error!(error = %e, "Error processing batch");
                        tokio::select! {
                            _ = ctx.cancelled() => break,
                            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        }
                    }
                }
            }
        }

        info!("Consumer stopped gracefully");
        Ok(())
    }

    /// Fetch one batch, run the processor over it and settle every message
    pub async fn fetch_and_process_batch(&self) -> Result<()> {
        let fetched = self
            .consumer
            .fetch_messages(self.batch_size, self.max_wait)
            .await?;

        if fetched.is_empty() {
            debug!("No messages in batch");
            return Ok(());
        }

        debug!(message_count = fetched.len(), "Received message batch");

        let messages: Vec<InboundMessage> = fetched.iter().map(|f| f.message.clone()).collect();
        let result = match (self.processor)(messages).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Processor returned error, rejecting all messages");
                ProcessingResult::nak_all(fetched.len(), Some(e.to_string()))
            }
        };

        for (idx, fetched_message) in fetched.iter().enumerate() {
            let decision = result.decision_for(idx);
            if let AckDecision::Nak(reason) = &decision {
                warn!(
                    message_index = idx,
                    subject = %fetched_message.message.subject,
                    reason = reason.as_deref().unwrap_or("unspecified"),
                    "Rejecting message for redelivery"
                );
            }
            if let Err(e) = fetched_message.acker.settle(decision).await {
                error!(error = %e, message_index = idx, "Failed to settle message");
            }
        }

        Ok(())
    }
}
