use crate::tags::{
    ConnectionMonitor, ConnectionPing, TagStore, TagStoreError, TagStoreResult,
};
use anyhow::Context;
use async_nats::jetstream;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, instrument};

/// Key prefix for connection pings stored next to regular tags
pub const CONNECTION_STATUS_PREFIX: &str = "connection_status";

/// Tag store backed by a NATS JetStream key-value bucket.
///
/// Values are stored JSON-encoded; clearing a tag deletes the key. Keys must
/// use the NATS KV alphabet (`[-/_=.a-zA-Z0-9]`), which covers TTN device ids.
pub struct NatsKvTagStore {
    store: jetstream::kv::Store,
}

impl NatsKvTagStore {
    /// Open the bucket, creating it when it does not exist yet
    pub async fn new(jetstream: &jetstream::Context, bucket: &str) -> anyhow::Result<Self> {
        debug!(bucket = %bucket, "initializing tag bucket");

        let store = match jetstream.get_key_value(bucket).await {
            Ok(store) => {
                debug!(bucket = %bucket, "tag bucket already exists");
                store
            }
            Err(_) => {
                debug!(bucket = %bucket, "creating tag bucket");
                jetstream
                    .create_key_value(jetstream::kv::Config {
                        bucket: bucket.to_string(),
                        description: "TTN bridge platform tags".to_string(),
                        history: 1,
                        ..Default::default()
                    })
                    .await
                    .context("failed to create tag bucket")?
            }
        };

        Ok(Self { store })
    }

    async fn put_json(&self, key: &str, value: &Value) -> TagStoreResult<()> {
        let encoded = serde_json::to_vec(value).map_err(|source| TagStoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store
            .put(key, Bytes::from(encoded))
            .await
            .with_context(|| format!("failed to put tag '{}'", key))
            .map_err(TagStoreError::Backend)?;
        Ok(())
    }
}

#[async_trait]
impl TagStore for NatsKvTagStore {
    #[instrument(skip(self))]
    async fn get_tag(&self, key: &str) -> TagStoreResult<Option<Value>> {
        let entry = self
            .store
            .get(key)
            .await
            .with_context(|| format!("failed to get tag '{}'", key))
            .map_err(TagStoreError::Backend)?;

        let Some(raw) = entry else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_slice(&raw).map_err(|source| TagStoreError::Decode {
            key: key.to_string(),
            source,
        })?;
        Ok((!value.is_null()).then_some(value))
    }

    #[instrument(skip(self, value))]
    async fn set_tag(&self, key: &str, value: Value) -> TagStoreResult<()> {
        if value.is_null() {
            self.store
                .delete(key)
                .await
                .with_context(|| format!("failed to delete tag '{}'", key))
                .map_err(TagStoreError::Backend)?;
            return Ok(());
        }
        self.put_json(key, &value).await
    }
}

#[async_trait]
impl ConnectionMonitor for NatsKvTagStore {
    #[instrument(skip(self, ping), fields(owner_key = %ping.owner_key))]
    async fn ping_connection(&self, ping: ConnectionPing) -> TagStoreResult<()> {
        let key = format!("{}_{}", CONNECTION_STATUS_PREFIX, ping.owner_key);
        let value = serde_json::to_value(&ping).map_err(|source| TagStoreError::Encode {
            key: key.clone(),
            source,
        })?;
        self.put_json(&key, &value).await
    }
}
