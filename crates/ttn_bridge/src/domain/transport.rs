use crate::domain::DownlinkPushRequest;
use async_trait::async_trait;
use thiserror::Error;

/// Status line and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced a response (connect failure, timeout, reset)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportFailure {
    pub message: String,
}

impl TransportFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Pushes one downlink request to the network server's application API
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DownlinkTransport: Send + Sync {
    async fn push_downlink(
        &self,
        ttn_device_id: &str,
        request: &DownlinkPushRequest,
    ) -> Result<HttpReply, TransportFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_2xx_is_success() {
        assert!(HttpReply::new(200, "").is_success());
        assert!(HttpReply::new(202, "").is_success());
        assert!(!HttpReply::new(199, "").is_success());
        assert!(!HttpReply::new(301, "").is_success());
    }
}
