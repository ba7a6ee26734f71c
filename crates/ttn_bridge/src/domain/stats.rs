use crate::domain::{BridgeResult, DEVICE_MAPPING_STATE_TAG, STATS_TAG, TagUpdater};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::sync::Arc;

/// Processor-level counters stored in the `stats` tag.
/// Unknown members written by other tools are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub uplinks_processed: u64,
    #[serde(default)]
    pub downlinks_sent: u64,
    #[serde(default)]
    pub errors: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Last-seen record for one device inside the `device_mapping_state` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSeen {
    pub owner_key: String,
    pub last_seen: String,
    pub rssi: Option<Number>,
    pub snr: Option<Number>,
}

/// Counter and mapping-state updates, all funnelled through one [`TagUpdater`]
pub struct StatsRecorder {
    updater: Arc<TagUpdater>,
}

impl StatsRecorder {
    pub fn new(updater: Arc<TagUpdater>) -> Self {
        Self { updater }
    }

    pub async fn record_uplink(&self) -> BridgeResult<Stats> {
        self.updater
            .update(STATS_TAG, |stats: &mut Stats| stats.uplinks_processed += 1)
            .await
    }

    pub async fn record_downlinks_sent(&self, sent: u64) -> BridgeResult<Stats> {
        self.updater
            .update(STATS_TAG, |stats: &mut Stats| stats.downlinks_sent += sent)
            .await
    }

    pub async fn record_error(&self) -> BridgeResult<Stats> {
        self.updater
            .update(STATS_TAG, |stats: &mut Stats| stats.errors += 1)
            .await
    }

    /// Replace the entry for `ttn_device_id`; other devices' entries are kept
    pub async fn record_device_seen(
        &self,
        ttn_device_id: &str,
        seen: DeviceSeen,
    ) -> BridgeResult<()> {
        let entry = serde_json::to_value(seen)?;
        self.updater
            .update(DEVICE_MAPPING_STATE_TAG, |state: &mut Map<String, Value>| {
                state.insert(ttn_device_id.to_string(), entry);
            })
            .await?;
        Ok(())
    }
}
