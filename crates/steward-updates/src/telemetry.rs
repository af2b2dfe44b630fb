use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreCheck {
    pub local_version: String,
    pub local_build: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionCheck {
    pub id: String,
    pub local_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryRequest {
    pub core: CoreCheck,
    pub extensions: Vec<ExtensionCheck>,
}

// Every remote field is optional: the normalizer decides what is usable.

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRelease {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub critical: Option<bool>,
    #[serde(default)]
    pub manual_update_required: Option<bool>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCoreInfo {
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub latest_build: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub critical_update_available: Option<bool>,
    #[serde(default)]
    pub manual_update_required: Option<bool>,
    #[serde(default)]
    pub releases: Vec<RemoteRelease>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteExtensionInfo {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub releases: Vec<RemoteRelease>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryResponse {
    #[serde(default)]
    pub core: Option<RemoteCoreInfo>,
    #[serde(default)]
    pub extensions: BTreeMap<String, RemoteExtensionInfo>,
}

/// `Ok(None)` means the authority had nothing to report. Timeouts are the
/// implementation's responsibility.
pub trait TelemetryClient {
    fn check(&self, request: &TelemetryRequest) -> Result<Option<TelemetryResponse>>;
}

#[derive(Debug, Clone)]
pub struct HttpTelemetryClient {
    endpoint: String,
    client: Client,
}

impl HttpTelemetryClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("steward/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build telemetry HTTP client")?;
        Ok(Self::with_client(endpoint, client))
    }

    pub fn with_client(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TelemetryClient for HttpTelemetryClient {
    fn check(&self, request: &TelemetryRequest) -> Result<Option<TelemetryResponse>> {
        debug!(
            endpoint = %self.endpoint,
            extensions = request.extensions.len(),
            "sending update check"
        );
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .with_context(|| format!("telemetry-request-failed: POST {}", self.endpoint))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(anyhow!(
                "telemetry-request-failed: POST {} returned {}",
                self.endpoint,
                status
            ));
        }

        let body = response.text().with_context(|| {
            format!(
                "telemetry-request-failed: reading body from {}",
                self.endpoint
            )
        })?;
        parse_telemetry_body(&body)
    }
}

pub(crate) fn parse_telemetry_body(body: &str) -> Result<Option<TelemetryResponse>> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    let parsed = serde_json::from_str::<TelemetryResponse>(trimmed)
        .context("telemetry-response-invalid: body is not a telemetry response")?;
    Ok(Some(parsed))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTelemetryClient;

impl TelemetryClient for DisabledTelemetryClient {
    fn check(&self, _request: &TelemetryRequest) -> Result<Option<TelemetryResponse>> {
        Err(anyhow!("telemetry-disabled: no telemetry endpoint is configured"))
    }
}
