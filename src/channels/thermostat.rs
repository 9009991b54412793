use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::http;

/// A temporary thermostat hold, temperatures in whole degrees Fahrenheit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldSetting {
    pub heat_hold_f: i32,
    pub cool_hold_f: i32,
    pub hold_hours: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThermostatClient: Send + Sync {
    /// Applies `hold` to every thermostat registered to the token's account.
    async fn set_hold(&self, access_token: &str, hold: &HoldSetting) -> Result<()>;
}

/// ecobee API v1 client.
#[derive(Clone)]
pub struct EcobeeClient {
    base_url: String,
    client: reqwest::Client,
}

impl EcobeeClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url,
            client: http::client(timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FunctionResponse {
    status: FunctionStatus,
}

#[derive(Debug, Deserialize)]
struct FunctionStatus {
    code: i64,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl ThermostatClient for EcobeeClient {
    async fn set_hold(&self, access_token: &str, hold: &HoldSetting) -> Result<()> {
        // The API takes temperatures in tenths of a degree.
        let payload = json!({
            "selection": {"selectionType": "registered", "selectionMatch": ""},
            "functions": [{
                "type": "setHold",
                "params": {
                    "holdType": "holdHours",
                    "holdHours": hold.hold_hours,
                    "heatHoldTemp": hold.heat_hold_f * 10,
                    "coolHoldTemp": hold.cool_hold_f * 10,
                }
            }]
        });

        let url = format!("{}/1/thermostat", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .query(&[("format", "json")])
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .context("ecobee POST failed")?;
        let body = http::success_body(resp, "ecobee").await?;

        let parsed: FunctionResponse =
            serde_json::from_str(&body).context("ecobee JSON parse failed")?;
        if parsed.status.code != 0 {
            anyhow::bail!(
                "ecobee rejected setHold: code {}: {}",
                parsed.status.code,
                parsed.status.message
            );
        }
        Ok(())
    }
}
