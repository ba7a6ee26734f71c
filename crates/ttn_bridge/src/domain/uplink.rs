use crate::domain::{BridgeError, BridgeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Subset of a TTN uplink webhook message; every other field is ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TtnUplinkMessage {
    #[serde(default)]
    pub end_device_ids: EndDeviceIds,
    #[serde(default)]
    pub uplink_message: UplinkMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndDeviceIds {
    pub device_id: Option<String>,
    pub dev_eui: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UplinkMessage {
    pub f_port: Option<u32>,
    pub f_cnt: Option<u64>,
    pub frm_payload: Option<String>,
    pub decoded_payload: Option<Value>,
    pub rx_metadata: Option<Vec<RxMetadata>>,
    pub received_at: Option<String>,
}

/// Reception report from one gateway. Signal values keep the number as TTN
/// sent it, so an integer RSSI is written back as an integer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RxMetadata {
    pub rssi: Option<Number>,
    pub snr: Option<Number>,
}

/// Gateways that did not report an RSSI rank below any real reading
const MISSING_RSSI: f64 = -999.0;

/// Parse an inbound payload: a JSON object, or a JSON string holding one.
///
/// Input that is not JSON at all is a [`BridgeError::Parse`]. Valid JSON whose
/// consumed fields have the wrong shape is a [`BridgeError::Malformed`].
pub fn parse_uplink(payload: &[u8]) -> BridgeResult<TtnUplinkMessage> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| BridgeError::Parse(e.to_string()))?;
    let value = match value {
        Value::String(inner) => {
            serde_json::from_str(&inner).map_err(|e| BridgeError::Parse(e.to_string()))?
        }
        other => other,
    };
    serde_json::from_value(value).map_err(|e| BridgeError::Malformed(e.to_string()))
}

/// Gateway with the strongest signal; the first one wins a tie
pub fn best_gateway(rx_metadata: &[RxMetadata]) -> Option<&RxMetadata> {
    rx_metadata.iter().fold(None, |best, candidate| match best {
        Some(current) if rssi_rank(candidate) <= rssi_rank(current) => Some(current),
        _ => Some(candidate),
    })
}

fn rssi_rank(gateway: &RxMetadata) -> f64 {
    gateway
        .rssi
        .as_ref()
        .and_then(Number::as_f64)
        .unwrap_or(MISSING_RSSI)
}

/// Parsed uplink as written to the uplink tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkRecord {
    pub device_id: String,
    pub dev_eui: Option<String>,
    pub f_port: Option<u32>,
    pub f_cnt: Option<u64>,
    #[serde(rename = "payload")]
    pub raw_payload: Option<String>,
    pub decoded_payload: Option<Value>,
    pub rssi: Option<Number>,
    pub snr: Option<Number>,
    pub timestamp: String,
}

impl UplinkRecord {
    /// Build the record; `now` stands in for a missing receive time
    pub fn from_message(message: TtnUplinkMessage, now: DateTime<Utc>) -> BridgeResult<Self> {
        let device_id = message
            .end_device_ids
            .device_id
            .filter(|id| !id.is_empty())
            .ok_or(BridgeError::MissingDeviceId)?;

        let uplink = message.uplink_message;
        let (rssi, snr) = uplink
            .rx_metadata
            .as_deref()
            .and_then(best_gateway)
            .map_or((None, None), |gateway| {
                (gateway.rssi.clone(), gateway.snr.clone())
            });

        Ok(Self {
            device_id,
            dev_eui: message.end_device_ids.dev_eui,
            f_port: uplink.f_port,
            f_cnt: uplink.f_cnt,
            raw_payload: uplink.frm_payload,
            decoded_payload: uplink.decoded_payload,
            rssi,
            snr,
            timestamp: uplink
                .received_at
                .filter(|at| !at.is_empty())
                .unwrap_or_else(|| now.to_rfc3339()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn gateway(rssi: Value, snr: Value) -> RxMetadata {
        serde_json::from_value(json!({"rssi": rssi, "snr": snr})).unwrap()
    }

    #[test]
    fn test_parse_accepts_object_and_encoded_string() {
        let object = json!({"end_device_ids": {"device_id": "eui-01"}});
        let encoded = serde_json::to_vec(&object.to_string()).unwrap();

        let from_object = parse_uplink(object.to_string().as_bytes()).unwrap();
        let from_string = parse_uplink(&encoded).unwrap();

        assert_eq!(from_object.end_device_ids.device_id.as_deref(), Some("eui-01"));
        assert_eq!(from_string.end_device_ids.device_id.as_deref(), Some("eui-01"));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let result = parse_uplink(b"{not json");
        assert!(matches!(result, Err(BridgeError::Parse(_))));

        let result = parse_uplink(br#""{still not json""#);
        assert!(matches!(result, Err(BridgeError::Parse(_))));
    }

    #[test]
    fn test_parse_flags_wrong_field_shapes_as_malformed() {
        for payload in [
            json!({"end_device_ids": null}),
            json!({
                "end_device_ids": {"device_id": "eui-01"},
                "uplink_message": {"rx_metadata": [5]}
            }),
            json!([1, 2]),
        ] {
            let result = parse_uplink(payload.to_string().as_bytes());
            assert!(matches!(result, Err(BridgeError::Malformed(_))), "{payload}");
        }
    }

    #[test]
    fn test_best_gateway_picks_max_rssi() {
        let gateways = vec![gateway(json!(-80), json!(5)), gateway(json!(-60.5), json!(2))];

        assert_eq!(best_gateway(&gateways), Some(&gateways[1]));
    }

    #[test]
    fn test_best_gateway_first_maximum_wins() {
        let gateways = vec![
            gateway(Value::Null, json!(9)),
            gateway(json!(-70), json!(1)),
            gateway(json!(-70.0), json!(7)),
        ];

        assert_eq!(best_gateway(&gateways).unwrap().snr, Some(Number::from(1)));
        assert_eq!(best_gateway(&[]), None);
    }

    #[test]
    fn test_record_from_full_message() {
        let message: TtnUplinkMessage = serde_json::from_value(json!({
            "end_device_ids": {"device_id": "eui-01", "dev_eui": "0004A30B001C0530"},
            "uplink_message": {
                "f_port": 2,
                "f_cnt": 41,
                "frm_payload": "AQI=",
                "decoded_payload": {"temperature": 21.5},
                "rx_metadata": [{"rssi": -80, "snr": 5}, {"rssi": -60, "snr": 2}],
                "received_at": "2026-10-16T11:59:58Z",
                "settings": {"data_rate": {}}
            }
        }))
        .unwrap();

        let record = UplinkRecord::from_message(message, now()).unwrap();

        assert_eq!(record.rssi, Some(Number::from(-60)));
        assert_eq!(record.snr, Some(Number::from(2)));
        assert_eq!(record.timestamp, "2026-10-16T11:59:58Z");
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "device_id": "eui-01",
                "dev_eui": "0004A30B001C0530",
                "f_port": 2,
                "f_cnt": 41,
                "payload": "AQI=",
                "decoded_payload": {"temperature": 21.5},
                "rssi": -60,
                "snr": 2,
                "timestamp": "2026-10-16T11:59:58Z"
            })
        );
    }

    #[test]
    fn test_signal_values_keep_their_number_form() {
        let message: TtnUplinkMessage = serde_json::from_value(json!({
            "end_device_ids": {"device_id": "eui-01"},
            "uplink_message": {"rx_metadata": [{"rssi": -60, "snr": 7.25}]}
        }))
        .unwrap();

        let record = UplinkRecord::from_message(message, now()).unwrap();
        let stored = serde_json::to_value(record).unwrap();

        assert_eq!(stored["rssi"], json!(-60));
        assert_ne!(stored["rssi"], json!(-60.0));
        assert_eq!(stored["snr"], json!(7.25));
    }

    #[test]
    fn test_record_without_metadata_has_no_signal() {
        let message: TtnUplinkMessage =
            serde_json::from_value(json!({"end_device_ids": {"device_id": "eui-01"}})).unwrap();

        let record = UplinkRecord::from_message(message, now()).unwrap();

        assert_eq!(record.rssi, None);
        assert_eq!(record.snr, None);
        assert_eq!(record.timestamp, now().to_rfc3339());
    }

    #[test]
    fn test_record_requires_device_id() {
        let message: TtnUplinkMessage =
            serde_json::from_value(json!({"end_device_ids": {"device_id": ""}})).unwrap();

        let result = UplinkRecord::from_message(message, now());

        assert!(matches!(result, Err(BridgeError::MissingDeviceId)));
    }
}
