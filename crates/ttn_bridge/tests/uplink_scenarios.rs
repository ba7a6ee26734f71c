use common::{InMemoryTagStore, TagStore};
use serde_json::{Value, json};
use std::sync::Arc;
use ttn_bridge::{
    BridgeContext, DeviceMap, DeviceMappingEntry, TagNames, UplinkIngestor, UplinkOutcome,
};

fn ingestor(store: &Arc<InMemoryTagStore>, names: TagNames) -> UplinkIngestor {
    UplinkIngestor::new(BridgeContext::new(
        DeviceMap::from_entries(&[
            DeviceMappingEntry::new("eui-01", "owner-1"),
            DeviceMappingEntry::new("eui-02", "owner-2"),
            DeviceMappingEntry::new("eui-03", ""),
        ]),
        store.clone(),
        store.clone(),
        names,
        false,
    ))
}

fn webhook(device_id: &str, rx_metadata: Option<Value>) -> Vec<u8> {
    let mut uplink = json!({
        "f_port": 1,
        "f_cnt": 12,
        "decoded_payload": {"battery": 3.6},
        "received_at": "2026-10-16T08:00:00.123Z"
    });
    if let Some(metadata) = rx_metadata {
        uplink["rx_metadata"] = metadata;
    }
    json!({
        "end_device_ids": {"device_id": device_id, "application_ids": {"application_id": "my-app"}},
        "uplink_message": uplink
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn test_uplink_without_metadata_stores_absent_signal() {
    let store = Arc::new(InMemoryTagStore::new());

    ingestor(&store, TagNames::default())
        .ingest(&webhook("eui-01", None))
        .await;

    let record = store.get_tag("ttn_uplink_eui-01").await.unwrap().unwrap();
    assert!(record["rssi"].is_null());
    assert!(record["snr"].is_null());
    assert_eq!(record["timestamp"], "2026-10-16T08:00:00.123Z");

    let state = store.get_tag("device_mapping_state").await.unwrap().unwrap();
    assert_eq!(state["eui-01"]["owner_key"], "owner-1");
    assert!(state["eui-01"]["rssi"].is_null());
}

#[tokio::test]
async fn test_strongest_gateway_is_reported() {
    let store = Arc::new(InMemoryTagStore::new());

    ingestor(&store, TagNames::default())
        .ingest(&webhook(
            "eui-02",
            Some(json!([{"rssi": -80, "snr": 5}, {"rssi": -60, "snr": 2}])),
        ))
        .await;

    let record = store.get_tag("ttn_uplink_eui-02").await.unwrap().unwrap();
    assert_eq!(record["rssi"], json!(-60));
    assert_eq!(record["snr"], json!(2));
}

#[tokio::test]
async fn test_custom_tag_names_and_encoded_string_payload() {
    let store = Arc::new(InMemoryTagStore::new());
    let encoded = serde_json::to_vec(&String::from_utf8(webhook("eui-01", None)).unwrap()).unwrap();

    let outcome = ingestor(&store, TagNames::new("lora_up", "", ""))
        .ingest(&encoded)
        .await;

    assert!(matches!(outcome, UplinkOutcome::Stored { .. }));
    assert!(store.get_tag("lora_up_eui-01").await.unwrap().is_some());
    assert!(store.get_tag("lora_up").await.unwrap().is_some());
    assert_eq!(store.get_tag("ttn_uplink").await.unwrap(), None);
}

#[tokio::test]
async fn test_successive_uplinks_accumulate_stats_and_state() {
    let store = Arc::new(InMemoryTagStore::new());
    let ingestor = ingestor(&store, TagNames::default());

    ingestor.ingest(&webhook("eui-01", None)).await;
    ingestor.ingest(&webhook("eui-02", None)).await;
    ingestor.ingest(&webhook("eui-03", None)).await;

    let stats = store.get_tag("stats").await.unwrap().unwrap();
    assert_eq!(stats["uplinks_processed"], 2);
    let state = store.get_tag("device_mapping_state").await.unwrap().unwrap();
    assert_eq!(state.as_object().unwrap().len(), 2);
    assert_eq!(store.get_tag("ttn_uplink").await.unwrap().unwrap()["device_id"], "eui-02");
    assert_eq!(store.pings().await.len(), 2);
}
