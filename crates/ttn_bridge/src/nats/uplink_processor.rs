use crate::domain::{UplinkIngestor, UplinkOutcome};
use common::nats::{BatchProcessor, InboundMessage, ProcessingResult};
use std::sync::Arc;
use tracing::debug;

/// Create a BatchProcessor that feeds each uplink message through the ingestor
///
/// Messages are processed in order, one at a time. Every message is acked:
/// ingest failures are already recorded and redelivery would fail the same way.
pub fn create_uplink_processor(ingestor: Arc<UplinkIngestor>) -> BatchProcessor {
    Box::new(move |messages: Vec<InboundMessage>| {
        let ingestor = Arc::clone(&ingestor);

        Box::pin(async move {
            let mut stored = 0usize;
            for message in &messages {
                let outcome = ingestor.ingest(&message.payload).await;
                if matches!(outcome, UplinkOutcome::Stored { .. }) {
                    stored += 1;
                }
                debug!(subject = %message.subject, outcome = ?outcome, "uplink message handled");
            }

            debug!(count = messages.len(), stored, "uplink batch processed");
            Ok(ProcessingResult::ack_all(messages.len()))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BridgeContext, DeviceMap, DeviceMappingEntry, TagNames};
    use bytes::Bytes;
    use common::{InMemoryTagStore, TagStore};

    fn message(payload: &'static str) -> InboundMessage {
        InboundMessage {
            subject: "ttn_uplinks.my-app.eui-01".to_string(),
            payload: Bytes::from_static(payload.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_every_message_is_acked() {
        let store = Arc::new(InMemoryTagStore::new());
        let ingestor = Arc::new(UplinkIngestor::new(BridgeContext::new(
            DeviceMap::from_entries(&[DeviceMappingEntry::new("eui-01", "owner-1")]),
            store.clone(),
            store.clone(),
            TagNames::default(),
            false,
        )));
        let processor = create_uplink_processor(ingestor);

        let result = processor(vec![
            message(r#"{"end_device_ids": {"device_id": "eui-01"}}"#),
            message("garbage"),
            message(r#"{"end_device_ids": {"device_id": "eui-77"}}"#),
        ])
        .await
        .unwrap();

        assert_eq!(result, ProcessingResult::ack_all(3));
        assert!(store.get_tag("ttn_uplink_eui-01").await.unwrap().is_some());
        assert!(store.get_tag("ttn_uplink_eui-77").await.unwrap().is_none());
    }
}
