use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ttn_bridge::{
    DEFAULT_DOWNLINK_REQUEST_TAG, DEFAULT_DOWNLINK_STATUS_TAG, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_TTN_API_URL, DEFAULT_UPLINK_TAG, DEFAULT_WEBHOOK_ID, DeviceMappingEntry, TagNames,
    TtnSettings, parse_mapping_pairs,
};

const ENV_PREFIX: &str = "TTN_BRIDGE";
/// Names an optional TOML/YAML/JSON file layered beneath the environment
pub const CONFIG_FILE_ENV: &str = "TTN_BRIDGE_CONFIG_FILE";

#[derive(Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // TTN configuration
    /// TTN cluster base URL
    #[serde(default = "default_ttn_api_url")]
    pub ttn_api_url: String,

    #[serde(default)]
    pub ttn_application_id: String,

    /// Bearer token with downlink write rights
    #[serde(default)]
    pub ttn_api_key: String,

    /// Webhook id used in the downlink API path
    #[serde(default = "default_ttn_webhook_id")]
    pub ttn_webhook_id: String,

    /// Attempts per downlink before giving up until the next tick
    #[serde(default = "default_downlink_max_attempts")]
    pub downlink_max_attempts: u32,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    // Tag names
    #[serde(default = "default_uplink_tag_name")]
    pub uplink_tag_name: String,

    #[serde(default = "default_downlink_request_tag")]
    pub downlink_request_tag: String,

    #[serde(default = "default_downlink_status_tag")]
    pub downlink_status_tag: String,

    /// NATS KV bucket holding the tags
    #[serde(default = "default_tag_bucket")]
    pub tag_bucket: String,

    // Device mapping
    /// `[{ttn_device_id, owner_key}]`, usually from the config file
    #[serde(default)]
    pub device_mapping: Vec<DeviceMappingEntry>,

    /// Env-friendly form: `dev-a=owner-a,dev-b=owner-b`
    #[serde(default)]
    pub device_mapping_pairs: String,

    /// Note unmapped devices in `last_error`
    #[serde(default)]
    pub debug_enabled: bool,

    /// Seconds between downlink checks
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// JetStream stream receiving TTN uplink webhooks
    #[serde(default = "default_nats_uplink_stream")]
    pub nats_uplink_stream: String,

    #[serde(default = "default_nats_uplink_subject")]
    pub nats_uplink_subject: String,

    /// Durable consumer name
    #[serde(default = "default_nats_consumer_name")]
    pub nats_consumer_name: String,

    /// Batch size for consumer
    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait time for batches in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // OpenTelemetry configuration
    /// OpenTelemetry OTLP endpoint (gRPC)
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Enable OpenTelemetry export
    #[serde(default)]
    pub otel_enabled: bool,

    /// Service name for OpenTelemetry resource
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

// TTN defaults
fn default_ttn_api_url() -> String {
    DEFAULT_TTN_API_URL.to_string()
}

fn default_ttn_webhook_id() -> String {
    DEFAULT_WEBHOOK_ID.to_string()
}

fn default_downlink_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_http_timeout_secs() -> u64 {
    30
}

// Tag defaults
fn default_uplink_tag_name() -> String {
    DEFAULT_UPLINK_TAG.to_string()
}

fn default_downlink_request_tag() -> String {
    DEFAULT_DOWNLINK_REQUEST_TAG.to_string()
}

fn default_downlink_status_tag() -> String {
    DEFAULT_DOWNLINK_STATUS_TAG.to_string()
}

fn default_tag_bucket() -> String {
    "ttn_bridge_tags".to_string()
}

fn default_schedule_interval_secs() -> u64 {
    60
}

// NATS defaults
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_uplink_stream() -> String {
    "ttn_uplinks".to_string()
}

fn default_nats_uplink_subject() -> String {
    "ttn_uplinks.>".to_string()
}

fn default_nats_consumer_name() -> String {
    "ttn-bridge".to_string()
}

fn default_nats_batch_size() -> usize {
    30
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_startup_timeout_secs() -> u64 {
    30
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "ttn-bridge".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(File::with_name(&path));
        }
        builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()
    }

    /// File entries first, then the env pairs, so env pairs win on duplicates
    pub fn device_entries(&self) -> Vec<DeviceMappingEntry> {
        let mut entries = self.device_mapping.clone();
        entries.extend(parse_mapping_pairs(&self.device_mapping_pairs));
        entries
    }

    pub fn tag_names(&self) -> TagNames {
        TagNames::new(
            &self.uplink_tag_name,
            &self.downlink_request_tag,
            &self.downlink_status_tag,
        )
    }

    pub fn ttn_settings(&self) -> TtnSettings {
        TtnSettings::new(
            &self.ttn_api_url,
            &self.ttn_application_id,
            &self.ttn_api_key,
            &self.ttn_webhook_id,
        )
        .with_max_attempts(self.downlink_max_attempts)
        .with_request_timeout(Duration::from_secs(self.http_timeout_secs))
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("log_level", &self.log_level)
            .field("ttn_api_url", &self.ttn_api_url)
            .field("ttn_application_id", &self.ttn_application_id)
            .field("ttn_api_key", &"<redacted>")
            .field("ttn_webhook_id", &self.ttn_webhook_id)
            .field("downlink_max_attempts", &self.downlink_max_attempts)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("uplink_tag_name", &self.uplink_tag_name)
            .field("downlink_request_tag", &self.downlink_request_tag)
            .field("downlink_status_tag", &self.downlink_status_tag)
            .field("tag_bucket", &self.tag_bucket)
            .field("device_mapping", &self.device_entries().len())
            .field("debug_enabled", &self.debug_enabled)
            .field("schedule_interval_secs", &self.schedule_interval_secs)
            .field("nats_url", &self.nats_url)
            .field("nats_uplink_stream", &self.nats_uplink_stream)
            .field("nats_uplink_subject", &self.nats_uplink_subject)
            .field("nats_consumer_name", &self.nats_consumer_name)
            .field("otel_enabled", &self.otel_enabled)
            .field("otel_endpoint", &self.otel_endpoint)
            .finish_non_exhaustive()
    }
}
