use crate::tags::{ConnectionMonitor, ConnectionPing, TagStore, TagStoreResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory tag store and connection monitor.
///
/// Used for local runs without NATS and as the backing store in tests. Clones
/// share the same underlying maps.
#[derive(Clone, Default)]
pub struct InMemoryTagStore {
    tags: Arc<RwLock<HashMap<String, Value>>>,
    pings: Arc<RwLock<Vec<ConnectionPing>>>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with tags. Seeding does not count as writes.
    pub fn with_tags<I, K>(tags: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let seeded = tags
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.into(), value))
            .collect();
        Self {
            tags: Arc::new(RwLock::new(seeded)),
            ..Self::default()
        }
    }

    /// Copy of every tag currently set
    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.tags.read().await.clone()
    }

    /// Every connection ping received, oldest first
    pub async fn pings(&self) -> Vec<ConnectionPing> {
        self.pings.read().await.clone()
    }

    /// Number of `set_tag` calls, including clears
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagStore for InMemoryTagStore {
    async fn get_tag(&self, key: &str) -> TagStoreResult<Option<Value>> {
        let tags = self.tags.read().await;
        Ok(tags.get(key).cloned())
    }

    async fn set_tag(&self, key: &str, value: Value) -> TagStoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut tags = self.tags.write().await;
        if value.is_null() {
            tags.remove(key);
        } else {
            tags.insert(key.to_string(), value);
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionMonitor for InMemoryTagStore {
    async fn ping_connection(&self, ping: ConnectionPing) -> TagStoreResult<()> {
        self.pings.write().await.push(ping);
        Ok(())
    }
}
