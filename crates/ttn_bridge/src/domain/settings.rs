use common::garde::{ValidationError, validate_struct};
use garde::Validate;
use std::fmt;
use std::time::Duration;

pub const STATS_TAG: &str = "stats";
pub const LAST_UPLINK_AT_TAG: &str = "last_uplink_at";
pub const LAST_DOWNLINK_AT_TAG: &str = "last_downlink_at";
pub const LAST_ERROR_TAG: &str = "last_error";
pub const DEVICE_MAPPING_STATE_TAG: &str = "device_mapping_state";

pub const DEFAULT_UPLINK_TAG: &str = "ttn_uplink";
pub const DEFAULT_DOWNLINK_REQUEST_TAG: &str = "ttn_downlink_request";
pub const DEFAULT_DOWNLINK_STATUS_TAG: &str = "ttn_downlink_status";
pub const DEFAULT_TTN_API_URL: &str = "https://eu1.cloud.thethings.network";
pub const DEFAULT_WEBHOOK_ID: &str = "doover";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configurable tag name prefixes and the keys derived from them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNames {
    uplink: String,
    downlink_request: String,
    downlink_status: String,
}

impl Default for TagNames {
    fn default() -> Self {
        Self::new("", "", "")
    }
}

impl TagNames {
    /// Empty names fall back to their defaults
    pub fn new(uplink: &str, downlink_request: &str, downlink_status: &str) -> Self {
        Self {
            uplink: or_default(uplink, DEFAULT_UPLINK_TAG),
            downlink_request: or_default(downlink_request, DEFAULT_DOWNLINK_REQUEST_TAG),
            downlink_status: or_default(downlink_status, DEFAULT_DOWNLINK_STATUS_TAG),
        }
    }

    /// Singleton tag holding the most recent uplink from any device
    pub fn latest_uplink(&self) -> &str {
        &self.uplink
    }

    pub fn uplink_key(&self, ttn_device_id: &str) -> String {
        format!("{}_{}", self.uplink, ttn_device_id)
    }

    pub fn downlink_request_key(&self, ttn_device_id: &str) -> String {
        format!("{}_{}", self.downlink_request, ttn_device_id)
    }

    pub fn downlink_status_key(&self, ttn_device_id: &str) -> String {
        format!("{}_{}", self.downlink_status, ttn_device_id)
    }
}

fn or_default(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

/// TTN Application Server connection settings
#[derive(Clone, Validate)]
pub struct TtnSettings {
    #[garde(url)]
    pub api_url: String,
    #[garde(skip)]
    pub application_id: String,
    #[garde(skip)]
    pub api_key: String,
    #[garde(length(min = 1))]
    pub webhook_id: String,
    #[garde(range(min = 1))]
    pub max_attempts: u32,
    #[garde(skip)]
    pub request_timeout: Duration,
}

impl TtnSettings {
    pub fn new(
        api_url: &str,
        application_id: &str,
        api_key: &str,
        webhook_id: &str,
    ) -> Self {
        Self {
            api_url: or_default(api_url, DEFAULT_TTN_API_URL)
                .trim_end_matches('/')
                .to_string(),
            application_id: application_id.trim().to_string(),
            api_key: api_key.trim().to_string(),
            webhook_id: or_default(webhook_id, DEFAULT_WEBHOOK_ID),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn check(&self) -> Result<(), ValidationError> {
        validate_struct(self)
    }

    /// Name of the first missing setting that blocks downlinks; `None` when
    /// both the application id and the API key are set
    pub fn missing_setting(&self) -> Option<&'static str> {
        if self.application_id.is_empty() {
            Some("TTN Application ID")
        } else if self.api_key.is_empty() {
            Some("TTN API Key")
        } else {
            None
        }
    }

    pub fn downlink_push_url(&self, ttn_device_id: &str) -> String {
        format!(
            "{}/api/v3/as/applications/{}/webhooks/{}/devices/{}/down/push",
            self.api_url, self.application_id, self.webhook_id, ttn_device_id
        )
    }
}

impl fmt::Debug for TtnSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtnSettings")
            .field("api_url", &self.api_url)
            .field("application_id", &self.application_id)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("webhook_id", &self.webhook_id)
            .field("max_attempts", &self.max_attempts)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
