use crate::domain::{
    BridgeContext, BridgeError, BridgeResult, DownlinkDeliverer, DownlinkRequest, DownlinkStatus,
    LAST_DOWNLINK_AT_TAG, TtnSettings, is_present,
};
use chrono::Utc;
use common::{TagStore, clear_tag, write_tag};
use tracing::{debug, error, info, instrument, warn};

/// Totals for one schedule tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// False when the tick was skipped for missing TTN credentials
    pub configured: bool,
    pub devices_checked: usize,
    pub sent: u64,
    pub failed: u64,
    pub invalid: u64,
}

impl DispatchSummary {
    pub fn is_idle(&self) -> bool {
        self.sent == 0 && self.failed == 0 && self.invalid == 0
    }
}

enum DeviceDispatch {
    Idle,
    Invalid,
    Sent,
    Failed,
}

/// Scans the request tag of every mapped device and pushes pending downlinks
///
/// A request tag is cleared only after TTN accepted the downlink. Any failure
/// leaves it in place, so the next tick tries again.
pub struct DownlinkDispatcher {
    ctx: BridgeContext,
    settings: TtnSettings,
    deliverer: DownlinkDeliverer,
}

impl DownlinkDispatcher {
    pub fn new(ctx: BridgeContext, settings: TtnSettings, deliverer: DownlinkDeliverer) -> Self {
        Self {
            ctx,
            settings,
            deliverer,
        }
    }

    #[instrument(skip(self), fields(devices = self.ctx.device_map.len()))]
    pub async fn run_tick(&self) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        if let Some(missing) = self.settings.missing_setting() {
            warn!(setting = missing, "TTN setting not configured, skipping downlink check");
            return summary;
        }
        summary.configured = true;

        for (ttn_device_id, owner_key) in self.ctx.device_map.iter() {
            summary.devices_checked += 1;
            match self.dispatch_device(ttn_device_id).await {
                Ok(DeviceDispatch::Idle) => {}
                Ok(DeviceDispatch::Invalid) => summary.invalid += 1,
                Ok(DeviceDispatch::Sent) => summary.sent += 1,
                Ok(DeviceDispatch::Failed) => summary.failed += 1,
                Err(e) => {
                    error!(
                        device_id = %ttn_device_id,
                        owner_key = %owner_key,
                        error = %e,
                        "error processing downlink"
                    );
                    summary.failed += 1;
                    self.ctx
                        .errors
                        .record_or_log(&format!("Downlink error for {ttn_device_id}: {e}"))
                        .await;
                    self.write_error_status(ttn_device_id, &e).await;
                }
            }
        }

        if summary.sent > 0 {
            if let Err(e) = self.record_sent(summary.sent).await {
                error!(error = %e, sent = summary.sent, "failed to update downlink stats");
            }
        }

        if summary.is_idle() {
            debug!("no pending downlinks");
        } else {
            info!(
                sent = summary.sent,
                failed = summary.failed,
                invalid = summary.invalid,
                "downlink check complete"
            );
        }
        summary
    }

    async fn dispatch_device(&self, ttn_device_id: &str) -> BridgeResult<DeviceDispatch> {
        let names = &self.ctx.tag_names;
        let tags = self.ctx.tags.as_ref();
        let request_key = names.downlink_request_key(ttn_device_id);

        let value = match tags.get_tag(&request_key).await? {
            Some(value) if is_present(&value) => value,
            _ => return Ok(DeviceDispatch::Idle),
        };

        let request = match DownlinkRequest::from_tag(ttn_device_id, value) {
            Ok(request) => request,
            Err(BridgeError::Validation { reason, .. }) => {
                warn!(device_id = %ttn_device_id, reason = %reason, "skipping invalid downlink request");
                return Ok(DeviceDispatch::Invalid);
            }
            Err(e) => return Err(e),
        };
        let Some(push) = request.to_push_request() else {
            warn!(device_id = %ttn_device_id, "downlink request has no payload, skipping");
            return Ok(DeviceDispatch::Invalid);
        };

        let status_key = names.downlink_status_key(ttn_device_id);
        match self.deliverer.deliver(ttn_device_id, &push).await {
            Ok(receipt) => {
                clear_tag(tags, &request_key).await?;
                write_tag(tags, &status_key, &DownlinkStatus::sent(&request, Utc::now())).await?;
                info!(
                    device_id = %ttn_device_id,
                    f_port = request.f_port,
                    attempts = receipt.attempts,
                    "sent downlink"
                );
                Ok(DeviceDispatch::Sent)
            }
            Err(delivery_error) => {
                write_tag(
                    tags,
                    &status_key,
                    &DownlinkStatus::failed(Some(&request), delivery_error.to_string()),
                )
                .await?;
                Ok(DeviceDispatch::Failed)
            }
        }
    }

    async fn write_error_status(&self, ttn_device_id: &str, cause: &BridgeError) {
        let status_key = self.ctx.tag_names.downlink_status_key(ttn_device_id);
        let status = DownlinkStatus::failed(None, cause.to_string());
        if let Err(e) = write_tag(self.ctx.tags.as_ref(), &status_key, &status).await {
            debug!(device_id = %ttn_device_id, error = %e, "failed to write error status");
        }
    }

    async fn record_sent(&self, sent: u64) -> BridgeResult<()> {
        self.ctx.stats.record_downlinks_sent(sent).await?;
        write_tag(
            self.ctx.tags.as_ref(),
            LAST_DOWNLINK_AT_TAG,
            &Utc::now().to_rfc3339(),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DeviceMap, DeviceMappingEntry, DownlinkPushRequest, HttpReply, MockDownlinkTransport,
        MockSleeper, RetryPolicy, TagNames,
    };
    use common::{MockConnectionMonitor, MockTagStore};
    use std::sync::Arc;

    fn settings() -> TtnSettings {
        TtnSettings::new(
            "https://eu1.cloud.thethings.network",
            "my-app",
            "NNSXS.secret",
            "",
        )
    }

    fn dispatcher(
        tags: MockTagStore,
        transport: MockDownlinkTransport,
        settings: TtnSettings,
    ) -> DownlinkDispatcher {
        let ctx = BridgeContext::new(
            DeviceMap::from_entries(&[
                DeviceMappingEntry::new("eui-01", "owner-1"),
                DeviceMappingEntry::new("eui-02", "owner-2"),
            ]),
            Arc::new(tags),
            Arc::new(MockConnectionMonitor::new()),
            TagNames::default(),
            false,
        );
        let deliverer = DownlinkDeliverer::new(
            Arc::new(transport),
            Arc::new(MockSleeper::new()),
            RetryPolicy::new(3),
            ctx.errors.clone(),
        );
        DownlinkDispatcher::new(ctx, settings, deliverer)
    }

    #[tokio::test]
    async fn test_tick_without_pending_requests_writes_nothing() {
        let mut tags = MockTagStore::new();
        tags.expect_get_tag()
            .withf(|key: &str| key.starts_with("ttn_downlink_request_"))
            .times(2)
            .returning(|_| Ok(None));
        tags.expect_set_tag().never();
        let mut transport = MockDownlinkTransport::new();
        transport.expect_push_downlink().never();

        let summary = dispatcher(tags, transport, settings()).run_tick().await;

        assert!(summary.configured);
        assert_eq!(summary.devices_checked, 2);
        assert!(summary.is_idle());
    }

    #[tokio::test]
    async fn test_unconfigured_tick_is_a_no_op() {
        let mut tags = MockTagStore::new();
        tags.expect_get_tag().never();
        tags.expect_set_tag().never();

        let summary = dispatcher(
            tags,
            MockDownlinkTransport::new(),
            TtnSettings::new("", "my-app", "", ""),
        )
        .run_tick()
        .await;

        assert!(!summary.configured);
        assert_eq!(summary.devices_checked, 0);
    }

    #[tokio::test]
    async fn test_sent_downlink_clears_request_and_counts() {
        let mut tags = MockTagStore::new();
        tags.expect_get_tag()
            .withf(|key: &str| key == "ttn_downlink_request_eui-01")
            .returning(|_| Ok(Some(serde_json::json!({"frm_payload": "AQ==", "f_port": 3}))));
        tags.expect_get_tag()
            .withf(|key: &str| key == "ttn_downlink_request_eui-02")
            .returning(|_| Ok(None));
        tags.expect_set_tag()
            .withf(|key: &str, value: &serde_json::Value| {
                key == "ttn_downlink_request_eui-01" && value.is_null()
            })
            .times(1)
            .returning(|_, _| Ok(()));
        tags.expect_set_tag()
            .withf(|key: &str, value: &serde_json::Value| {
                key == "ttn_downlink_status_eui-01" && value["status"] == "sent"
            })
            .times(1)
            .returning(|_, _| Ok(()));
        tags.expect_get_tag()
            .withf(|key: &str| key == "stats")
            .times(1)
            .returning(|_| Ok(None));
        tags.expect_set_tag()
            .withf(|key: &str, value: &serde_json::Value| {
                key == "stats" && value["downlinks_sent"] == 1 && value["errors"] == 0
            })
            .times(1)
            .returning(|_, _| Ok(()));
        tags.expect_set_tag()
            .withf(|key: &str, _value: &serde_json::Value| key == "last_downlink_at")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut transport = MockDownlinkTransport::new();
        transport
            .expect_push_downlink()
            .withf(|device_id: &str, request: &DownlinkPushRequest| {
                device_id == "eui-01" && request.downlinks[0].f_port == 3
            })
            .times(1)
            .returning(|_, _| Ok(HttpReply::new(200, "{}")));

        let summary = dispatcher(tags, transport, settings()).run_tick().await;

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_tag_read_failure_does_not_block_other_devices() {
        let mut tags = MockTagStore::new();
        tags.expect_get_tag()
            .withf(|key: &str| key == "ttn_downlink_request_eui-01")
            .returning(|_| {
                Err(common::TagStoreError::Backend(anyhow::anyhow!("bucket offline")))
            });
        tags.expect_get_tag()
            .withf(|key: &str| key == "ttn_downlink_request_eui-02")
            .times(1)
            .returning(|_| Ok(None));
        tags.expect_get_tag()
            .withf(|key: &str| key == "stats")
            .returning(|_| Ok(None));
        tags.expect_set_tag()
            .withf(|key: &str, value: &serde_json::Value| {
                key == "last_error"
                    && value
                        .as_str()
                        .is_some_and(|message| message.starts_with("Downlink error for eui-01:"))
            })
            .times(1)
            .returning(|_, _| Ok(()));
        tags.expect_set_tag()
            .withf(|key: &str, value: &serde_json::Value| key == "stats" && value["errors"] == 1)
            .times(1)
            .returning(|_, _| Ok(()));
        tags.expect_set_tag()
            .withf(|key: &str, value: &serde_json::Value| {
                key == "ttn_downlink_status_eui-01" && value["status"] == "error"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let summary =
            dispatcher(tags, MockDownlinkTransport::new(), settings()).run_tick().await;

        assert_eq!(summary.devices_checked, 2);
        assert_eq!(summary.failed, 1);
    }
}
