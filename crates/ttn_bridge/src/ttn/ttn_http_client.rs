use crate::domain::{DownlinkPushRequest, DownlinkTransport, HttpReply, TransportFailure, TtnSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

pub const USER_AGENT: &str = "ttn-bridge";

/// TTN Application Server client for `down/push` requests
///
/// Holds a single pooled `reqwest::Client` for the life of the process.
pub struct TtnHttpClient {
    client: reqwest::Client,
    settings: TtnSettings,
}

impl TtnHttpClient {
    pub fn new(settings: TtnSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build TTN HTTP client")?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl DownlinkTransport for TtnHttpClient {
    async fn push_downlink(
        &self,
        ttn_device_id: &str,
        request: &DownlinkPushRequest,
    ) -> Result<HttpReply, TransportFailure> {
        let url = self.settings.downlink_push_url(ttn_device_id);
        debug!(url = %url, "posting downlink to TTN");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportFailure::new(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpReply { status, body })
    }
}
