use crate::tags::TagStoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state reported alongside a liveness ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Device reports periodically; online until `offline_at` passes without a new ping
    PeriodicUnknown,
}

/// A liveness report for one owning entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPing {
    pub owner_key: String,
    pub online_at: DateTime<Utc>,
    pub offline_at: DateTime<Utc>,
    pub status: ConnectionStatus,
}

/// Records connection liveness for entities on the platform
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ConnectionMonitor: Send + Sync {
    async fn ping_connection(&self, ping: ConnectionPing) -> TagStoreResult<()>;
}
