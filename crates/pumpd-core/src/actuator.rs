use crate::config::Config;
use crate::error::{CoreError, Result};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Client for the actuator service's minimal HTTP API.
///
/// Every call is a single bounded-timeout request; retry and backoff policy
/// belongs to callers.
#[derive(Clone)]
pub struct ActuatorClient {
    http: reqwest::Client,
    base_url: String,
    ping_timeout: Duration,
}

impl ActuatorClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CoreError::DeviceConnect(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            ping_timeout: Duration::from_secs(config.ping_timeout_secs),
        })
    }

    /// Set the pump duty cycle. Returns the level echoed by the device.
    pub async fn set_level(&self, level: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&level) {
            return Err(CoreError::LevelOutOfRange);
        }
        debug!(level, "setting pump level");
        let resp = self
            .http
            .post(format!("{}/pump", self.base_url))
            .json(&json!({ "level": level }))
            .send()
            .await
            .map_err(classify)?;
        let status = resp.status();
        let body = resp.text().await.map_err(classify)?;
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(CoreError::DeviceRejected(body.trim().to_string()));
        }
        if !status.is_success() {
            return Err(CoreError::DeviceStatus(format!("status {status}")));
        }
        parse_level(&body)
    }

    /// Read the current pump duty cycle.
    pub async fn get_level(&self) -> Result<f64> {
        let resp = self
            .http
            .get(format!("{}/pump", self.base_url))
            .send()
            .await
            .map_err(classify)?;
        let status = resp.status();
        let body = resp.text().await.map_err(classify)?;
        if !status.is_success() {
            return Err(CoreError::DeviceStatus(format!("status {status}")));
        }
        parse_level(&body)
    }

    /// Liveness probe with a short timeout of its own.
    pub async fn ping(&self) -> Result<()> {
        let resp = self
            .http
            .get(format!("{}/marco", self.base_url))
            .timeout(self.ping_timeout)
            .send()
            .await
            .map_err(classify)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(CoreError::DeviceStatus(format!("status {}", resp.status())))
        }
    }
}

fn classify(err: reqwest::Error) -> CoreError {
    if err.is_timeout() {
        CoreError::DeviceTimeout
    } else {
        CoreError::DeviceConnect(err.to_string())
    }
}

/// Firmware revisions disagree on the body encoding: some return the bare
/// number, some wrap it as `{"level": x}`. Accept both.
fn parse_level(body: &str) -> Result<f64> {
    let trimmed = body.trim();
    if let Ok(level) = trimmed.parse::<f64>() {
        return Ok(level);
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(level) = value.get("level").and_then(|l| l.as_f64()) {
            return Ok(level);
        }
    }
    Err(CoreError::DeviceResponse(trimmed.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
