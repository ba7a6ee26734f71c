use crate::tags::{TagStoreError, TagStoreResult};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Key-value access to this process's platform tags.
///
/// Implementations must treat `Value::Null` as "clear the tag" and report a
/// cleared or missing tag as `None`. Stores may be remote and shared with
/// other processes, so no operation is atomic across calls.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Read a tag, `None` when absent or cleared
    async fn get_tag(&self, key: &str) -> TagStoreResult<Option<Value>>;

    /// Overwrite a tag; `Value::Null` clears it
    async fn set_tag(&self, key: &str, value: Value) -> TagStoreResult<()>;
}

/// Read a tag and deserialize it into `T`
pub async fn read_tag<T: DeserializeOwned>(
    store: &dyn TagStore,
    key: &str,
) -> TagStoreResult<Option<T>> {
    match store.get_tag(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| TagStoreError::Decode {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serialize `value` and write it to a tag
pub async fn write_tag<T: Serialize + ?Sized>(
    store: &dyn TagStore,
    key: &str,
    value: &T,
) -> TagStoreResult<()> {
    let encoded = serde_json::to_value(value).map_err(|source| TagStoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set_tag(key, encoded).await
}

/// Clear a tag
pub async fn clear_tag(store: &dyn TagStore, key: &str) -> TagStoreResult<()> {
    store.set_tag(key, Value::Null).await
}
