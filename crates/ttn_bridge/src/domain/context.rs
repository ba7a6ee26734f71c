use crate::domain::{DeviceMap, ErrorRecorder, StatsRecorder, TagNames, TagUpdater};
use common::{ConnectionMonitor, TagStore};
use std::sync::Arc;

/// Process-lifetime state shared by the uplink and downlink paths
///
/// Built once at startup; the device map is never mutated afterwards.
#[derive(Clone)]
pub struct BridgeContext {
    pub device_map: Arc<DeviceMap>,
    pub tags: Arc<dyn TagStore>,
    pub connections: Arc<dyn ConnectionMonitor>,
    pub tag_names: TagNames,
    pub debug_enabled: bool,
    pub stats: Arc<StatsRecorder>,
    pub errors: ErrorRecorder,
}

impl BridgeContext {
    pub fn new(
        device_map: DeviceMap,
        tags: Arc<dyn TagStore>,
        connections: Arc<dyn ConnectionMonitor>,
        tag_names: TagNames,
        debug_enabled: bool,
    ) -> Self {
        let stats = Arc::new(StatsRecorder::new(Arc::new(TagUpdater::new(tags.clone()))));
        let errors = ErrorRecorder::new(tags.clone(), stats.clone());
        Self {
            device_map: Arc::new(device_map),
            tags,
            connections,
            tag_names,
            debug_enabled,
            stats,
            errors,
        }
    }
}
