use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// One configured mapping from a TTN device id to the local owner key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMappingEntry {
    #[serde(default)]
    pub ttn_device_id: String,
    #[serde(default)]
    pub owner_key: String,
}

impl DeviceMappingEntry {
    pub fn new(ttn_device_id: impl Into<String>, owner_key: impl Into<String>) -> Self {
        Self {
            ttn_device_id: ttn_device_id.into(),
            owner_key: owner_key.into(),
        }
    }
}

/// Immutable TTN device id → owner key lookup, built once at startup
///
/// Iteration order is sorted by device id so downlink ticks visit devices in
/// a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMap {
    devices: BTreeMap<String, String>,
}

impl DeviceMap {
    /// Build from configured entries, skipping entries with an empty field.
    /// A later entry for the same device id replaces the earlier one.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a DeviceMappingEntry>,
    {
        let mut devices = BTreeMap::new();
        for entry in entries {
            if entry.ttn_device_id.is_empty() || entry.owner_key.is_empty() {
                continue;
            }
            if let Some(previous) =
                devices.insert(entry.ttn_device_id.clone(), entry.owner_key.clone())
            {
                warn!(
                    ttn_device_id = %entry.ttn_device_id,
                    previous_owner = %previous,
                    owner_key = %entry.owner_key,
                    "duplicate device mapping, last entry wins"
                );
            }
        }
        Self { devices }
    }

    /// Owner key for a TTN device, `None` when the device is not mapped
    pub fn resolve(&self, ttn_device_id: &str) -> Option<&str> {
        self.devices.get(ttn_device_id).map(String::as_str)
    }

    /// `(ttn_device_id, owner_key)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.devices
            .iter()
            .map(|(device, owner)| (device.as_str(), owner.as_str()))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Parse the env-friendly `"dev-a=owner-a,dev-b=owner-b"` form.
/// Pairs without `=` are ignored; whitespace around ids is trimmed.
pub fn parse_mapping_pairs(pairs: &str) -> Vec<DeviceMappingEntry> {
    pairs
        .split(',')
        .filter_map(|pair| {
            let (device, owner) = pair.split_once('=')?;
            Some(DeviceMappingEntry::new(device.trim(), owner.trim()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_configured_devices() {
        let entries = vec![
            DeviceMappingEntry::new("eui-0004a30b001c0530", "owner-a"),
            DeviceMappingEntry::new("eui-0004a30b001c0531", "owner-b"),
        ];

        let map = DeviceMap::from_entries(&entries);

        assert_eq!(map.len(), 2);
        for entry in &entries {
            assert_eq!(map.resolve(&entry.ttn_device_id), Some(entry.owner_key.as_str()));
        }
        assert_eq!(map.resolve("eui-ffffffffffffffff"), None);
    }

    #[test]
    fn test_entries_with_empty_fields_are_skipped() {
        let entries = vec![
            DeviceMappingEntry::new("", "owner-a"),
            DeviceMappingEntry::new("eui-01", ""),
            DeviceMappingEntry::new("eui-02", "owner-c"),
        ];

        let map = DeviceMap::from_entries(&entries);

        assert_eq!(map.len(), 1);
        assert_eq!(map.resolve("eui-01"), None);
        assert_eq!(map.resolve(""), None);
        assert_eq!(map.resolve("eui-02"), Some("owner-c"));
    }

    #[test]
    fn test_duplicate_device_last_entry_wins() {
        let entries = vec![
            DeviceMappingEntry::new("eui-01", "first"),
            DeviceMappingEntry::new("eui-01", "second"),
        ];

        let map = DeviceMap::from_entries(&entries);

        assert_eq!(map.len(), 1);
        assert_eq!(map.resolve("eui-01"), Some("second"));
    }

    #[test]
    fn test_iteration_is_sorted_by_device_id() {
        let entries = vec![
            DeviceMappingEntry::new("eui-b", "owner-b"),
            DeviceMappingEntry::new("eui-a", "owner-a"),
        ];

        let map = DeviceMap::from_entries(&entries);
        let devices: Vec<_> = map.iter().map(|(device, _)| device).collect();

        assert_eq!(devices, vec!["eui-a", "eui-b"]);
    }

    #[test]
    fn test_parse_mapping_pairs() {
        let entries = parse_mapping_pairs(" eui-01 = owner-1 ,eui-02=owner-2,garbage,");

        assert_eq!(
            entries,
            vec![
                DeviceMappingEntry::new("eui-01", "owner-1"),
                DeviceMappingEntry::new("eui-02", "owner-2"),
            ]
        );
    }
}
