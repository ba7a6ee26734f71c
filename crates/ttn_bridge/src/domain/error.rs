use common::TagStoreError;
use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("failed to parse uplink message: {0}")]
    Parse(String),

    #[error("uplink message missing device_id")]
    MissingDeviceId,

    #[error("malformed uplink message: {0}")]
    Malformed(String),

    #[error("invalid downlink request for device '{device_id}': {reason}")]
    Validation { device_id: String, reason: String },

    #[error(transparent)]
    TagStore(#[from] TagStoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a downlink push did not succeed
///
/// The display strings are what ends up in the `last_error` tag.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("TTN API authentication failed (401). Check API key.")]
    Unauthorized,

    #[error("TTN API 404: device '{device_id}' or webhook not found.")]
    NotFound { device_id: String },

    #[error("Rate limited (429): {body}")]
    RateLimited { body: String },

    #[error("Server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("TTN API error ({status}) for {device_id}: {body}")]
    ClientError {
        status: u16,
        device_id: String,
        body: String,
    },

    #[error("{0}")]
    Transport(String),

    #[error("Downlink failed for {device_id} after {attempts} retries: {last_error}")]
    Exhausted {
        device_id: String,
        attempts: u32,
        last_error: Box<DeliveryError>,
    },
}

impl DeliveryError {
    /// Whether another attempt may succeed without outside intervention
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::RateLimited { .. }
                | DeliveryError::ServerError { .. }
                | DeliveryError::Transport(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(DeliveryError::RateLimited { body: String::new() }.is_retryable());
        assert!(
            DeliveryError::ServerError {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(DeliveryError::Transport("connection reset".to_string()).is_retryable());

        assert!(!DeliveryError::Unauthorized.is_retryable());
        assert!(
            !DeliveryError::NotFound {
                device_id: "dev".to_string()
            }
            .is_retryable()
        );
        assert!(
            !DeliveryError::ClientError {
                status: 400,
                device_id: "dev".to_string(),
                body: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_exhausted_message_names_last_error() {
        let err = DeliveryError::Exhausted {
            device_id: "eui-01".to_string(),
            attempts: 3,
            last_error: Box::new(DeliveryError::ServerError {
                status: 500,
                body: "oops".to_string(),
            }),
        };

        assert_eq!(
            err.to_string(),
            "Downlink failed for eui-01 after 3 retries: Server error (500): oops"
        );
    }
}
