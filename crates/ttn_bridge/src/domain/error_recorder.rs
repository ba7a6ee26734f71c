use crate::domain::{BridgeResult, LAST_ERROR_TAG, StatsRecorder};
use common::TagStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

/// Shared error-recording path: overwrites `last_error` and bumps `stats.errors`.
///
/// This is the only place that increments the error counter.
#[derive(Clone)]
pub struct ErrorRecorder {
    tags: Arc<dyn TagStore>,
    stats: Arc<StatsRecorder>,
}

impl ErrorRecorder {
    pub fn new(tags: Arc<dyn TagStore>, stats: Arc<StatsRecorder>) -> Self {
        Self { tags, stats }
    }

    pub async fn record(&self, message: &str) -> BridgeResult<()> {
        self.note(message).await?;
        self.stats.record_error().await?;
        Ok(())
    }

    /// Record, logging instead of failing when the tag store is unavailable
    pub async fn record_or_log(&self, message: &str) {
        if let Err(e) = self.record(message).await {
            error!(error = %e, message = %message, "failed to record error");
        }
    }

    /// Overwrite `last_error` without counting it as an error
    pub async fn note(&self, message: &str) -> BridgeResult<()> {
        self.tags
            .set_tag(LAST_ERROR_TAG, Value::String(message.to_string()))
            .await?;
        Ok(())
    }
}
