use crate::domain::BridgeResult;
use common::{TagStore, read_tag, write_tag};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Read-modify-write helper for aggregate tags such as `stats`.
///
/// Updates issued through one updater are serialised, so the uplink consumer
/// and the downlink schedule never interleave their writes. Other processes
/// writing the same tags are not coordinated with: updates are best-effort,
/// not transactional.
pub struct TagUpdater {
    tags: Arc<dyn TagStore>,
    lock: Mutex<()>,
}

impl TagUpdater {
    pub fn new(tags: Arc<dyn TagStore>) -> Self {
        Self {
            tags,
            lock: Mutex::new(()),
        }
    }

    /// Apply `apply` to the current value of `key` (default when absent) and
    /// write the result back. Returns the written value.
    pub async fn update<T, F>(&self, key: &str, apply: F) -> BridgeResult<T>
    where
        T: DeserializeOwned + Serialize + Default + Send,
        F: FnOnce(&mut T) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut current: T = read_tag(self.tags.as_ref(), key).await?.unwrap_or_default();
        apply(&mut current);
        write_tag(self.tags.as_ref(), key, &current).await?;
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::InMemoryTagStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_update_starts_from_default() {
        let store = Arc::new(InMemoryTagStore::new());
        let updater = TagUpdater::new(store.clone());

        let written: u64 = updater.update("counter", |n: &mut u64| *n += 1).await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(store.get_tag("counter").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_lose_increments() {
        let store = Arc::new(InMemoryTagStore::new());
        let updater = Arc::new(TagUpdater::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let updater = updater.clone();
            handles.push(tokio::spawn(async move {
                updater
                    .update("counter", |n: &mut u64| *n += 1)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get_tag("counter").await.unwrap(), Some(json!(20)));
    }
}
