use crate::domain::{BridgeError, BridgeResult};
use chrono::{DateTime, Utc};
use common::garde::validate_struct;
use garde::Validate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_F_PORT: u32 = 1;
pub const DEFAULT_PRIORITY: &str = "NORMAL";
const PREVIEW_CHARS: usize = 50;

/// Pending downlink written by another application to the request tag
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct DownlinkRequest {
    /// LoRaWAN application port; missing or `null` means the default port
    #[serde(default = "default_f_port", deserialize_with = "f_port_or_default")]
    #[garde(range(min = 1, max = 223))]
    pub f_port: u32,
    #[serde(default, alias = "raw_payload")]
    #[garde(skip)]
    pub frm_payload: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub decoded_payload: Option<Value>,
    #[serde(default)]
    #[garde(skip)]
    pub priority: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub confirmed: Option<bool>,
}

fn default_f_port() -> u32 {
    DEFAULT_F_PORT
}

fn f_port_or_default<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(DEFAULT_F_PORT))
}

impl DownlinkRequest {
    /// Decode and validate a request tag value. A request must carry a payload.
    pub fn from_tag(ttn_device_id: &str, value: Value) -> BridgeResult<Self> {
        let invalid = |reason: String| BridgeError::Validation {
            device_id: ttn_device_id.to_string(),
            reason,
        };

        let request: Self = serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
        validate_struct(&request).map_err(|e| invalid(e.to_string()))?;
        if request.payload().is_none() {
            return Err(invalid("request has no payload".to_string()));
        }
        Ok(request)
    }

    /// Payload to send; the raw payload takes precedence over the decoded one
    pub fn payload(&self) -> Option<DownlinkPayload> {
        if let Some(raw) = self.frm_payload.as_ref().filter(|raw| !raw.is_empty()) {
            return Some(DownlinkPayload::FrmPayload(raw.clone()));
        }
        self.decoded_payload
            .as_ref()
            .filter(|decoded| is_present(decoded))
            .map(|decoded| DownlinkPayload::DecodedPayload(decoded.clone()))
    }

    pub fn to_push_request(&self) -> Option<DownlinkPushRequest> {
        let payload = self.payload()?;
        Some(DownlinkPushRequest {
            downlinks: vec![DownlinkPushBody {
                f_port: self.f_port,
                priority: self
                    .priority
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
                confirmed: self.confirmed.unwrap_or(false),
                payload,
            }],
        })
    }

    /// Short, human-readable form of the payload for the status tag
    pub fn payload_preview(&self) -> Option<String> {
        self.payload().map(|payload| payload.preview())
    }
}

/// Empty strings, empty collections, `null`, `false` and zero count as absent
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64() != Some(0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(members) => !members.is_empty(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownlinkPayload {
    /// Base64 frame payload, passed through untouched
    FrmPayload(String),
    /// Object for the application's payload formatter to encode
    DecodedPayload(Value),
}

impl DownlinkPayload {
    pub fn preview(&self) -> String {
        match self {
            DownlinkPayload::FrmPayload(raw) => raw.clone(),
            DownlinkPayload::DecodedPayload(decoded) => decoded
                .to_string()
                .chars()
                .take(PREVIEW_CHARS)
                .collect(),
        }
    }
}

/// One entry of the TTN `down/push` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownlinkPushBody {
    pub f_port: u32,
    pub priority: String,
    #[serde(skip_serializing_if = "is_false")]
    pub confirmed: bool,
    #[serde(flatten)]
    pub payload: DownlinkPayload,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownlinkPushRequest {
    pub downlinks: Vec<DownlinkPushBody>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownlinkStatusKind {
    Sent,
    Error,
}

/// Outcome of the latest dispatch for one device, written to the status tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkStatus {
    pub status: DownlinkStatusKind,
    pub sent_at: Option<String>,
    pub error: Option<String>,
    pub f_port: Option<u32>,
    pub payload_preview: Option<String>,
}

impl DownlinkStatus {
    pub fn sent(request: &DownlinkRequest, sent_at: DateTime<Utc>) -> Self {
        Self {
            status: DownlinkStatusKind::Sent,
            sent_at: Some(sent_at.to_rfc3339()),
            error: None,
            f_port: Some(request.f_port),
            payload_preview: request.payload_preview(),
        }
    }

    pub fn failed(request: Option<&DownlinkRequest>, error: impl Into<String>) -> Self {
        Self {
            status: DownlinkStatusKind::Error,
            sent_at: None,
            error: Some(error.into()),
            f_port: request.map(|r| r.f_port),
            payload_preview: request.and_then(|r| r.payload_preview()),
        }
    }
}
