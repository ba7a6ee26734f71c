use crate::domain::{
    BridgeContext, BridgeError, BridgeResult, DeviceSeen, LAST_UPLINK_AT_TAG, UplinkRecord,
    parse_uplink,
};
use chrono::{Duration, Utc};
use common::{ConnectionPing, ConnectionStatus, write_tag};
use tracing::{debug, error, info, instrument, warn};

/// How long a device's owner stays online after an uplink without a new one
const CONNECTION_WINDOW_HOURS: i64 = 1;

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UplinkOutcome {
    Stored {
        ttn_device_id: String,
        owner_key: String,
    },
    /// Not JSON; logged and dropped
    Unparseable,
    MissingDeviceId,
    Unmapped {
        ttn_device_id: String,
    },
    /// Wrongly shaped message or a failed write; the error has been recorded
    Failed,
}

/// Turns TTN uplink webhook messages into tag writes
///
/// Flow:
/// 1. Parse the payload (object or JSON-encoded string)
/// 2. Resolve the device through the device map
/// 3. Write the per-device and latest uplink tags
/// 4. Ping the owner's connection, bump stats and the device's mapping state
///
/// Failures never escape [`UplinkIngestor::ingest`]; one bad message must not
/// stop the subscription.
#[derive(Clone)]
pub struct UplinkIngestor {
    ctx: BridgeContext,
}

impl UplinkIngestor {
    pub fn new(ctx: BridgeContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, payload), fields(payload_size = payload.len()))]
    pub async fn ingest(&self, payload: &[u8]) -> UplinkOutcome {
        let message = match parse_uplink(payload) {
            Ok(message) => message,
            Err(BridgeError::Parse(e)) => {
                warn!(error = %e, "discarding unparseable uplink message");
                return UplinkOutcome::Unparseable;
            }
            Err(e) => return self.fail(e).await,
        };

        let record = match UplinkRecord::from_message(message, Utc::now()) {
            Ok(record) => record,
            Err(BridgeError::MissingDeviceId) => {
                warn!("uplink message missing device_id, skipping");
                return UplinkOutcome::MissingDeviceId;
            }
            Err(e) => return self.fail(e).await,
        };

        match self.store(record).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail(e).await,
        }
    }

    async fn fail(&self, e: BridgeError) -> UplinkOutcome {
        error!(error = %e, "error processing uplink message");
        self.ctx
            .errors
            .record_or_log(&format!("Uplink processing error: {e}"))
            .await;
        UplinkOutcome::Failed
    }

    async fn store(&self, record: UplinkRecord) -> BridgeResult<UplinkOutcome> {
        let ttn_device_id = record.device_id.clone();
        let Some(owner_key) = self.ctx.device_map.resolve(&ttn_device_id) else {
            warn!(device_id = %ttn_device_id, "no device mapping found for TTN device, skipping");
            if self.ctx.debug_enabled {
                self.ctx
                    .errors
                    .note(&format!("Unmapped TTN device: {ttn_device_id}"))
                    .await?;
            }
            return Ok(UplinkOutcome::Unmapped { ttn_device_id });
        };
        let owner_key = owner_key.to_string();
        let now = Utc::now();
        let names = &self.ctx.tag_names;
        let tags = self.ctx.tags.as_ref();

        write_tag(tags, &names.uplink_key(&ttn_device_id), &record).await?;
        write_tag(tags, names.latest_uplink(), &record).await?;
        debug!(device_id = %ttn_device_id, "uplink tags written");

        self.ctx
            .connections
            .ping_connection(ConnectionPing {
                owner_key: owner_key.clone(),
                online_at: now,
                offline_at: now + Duration::hours(CONNECTION_WINDOW_HOURS),
                status: ConnectionStatus::PeriodicUnknown,
            })
            .await?;

        self.ctx.stats.record_uplink().await?;
        write_tag(tags, LAST_UPLINK_AT_TAG, &now.to_rfc3339()).await?;
        self.ctx
            .stats
            .record_device_seen(
                &ttn_device_id,
                DeviceSeen {
                    owner_key: owner_key.clone(),
                    last_seen: now.to_rfc3339(),
                    rssi: record.rssi.clone(),
                    snr: record.snr.clone(),
                },
            )
            .await?;

        info!(device_id = %ttn_device_id, owner_key = %owner_key, "processed uplink");
        Ok(UplinkOutcome::Stored {
            ttn_device_id,
            owner_key,
        })
    }
}
