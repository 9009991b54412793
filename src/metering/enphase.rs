use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::MeteringProvider;
use crate::domain::{SystemId, SAMPLE_INTERVAL_MINUTES};
use crate::http;

/// Watt-hours over a 15-minute interval times four is average watts.
const WH_PER_INTERVAL_TO_WATTS: i64 = 60 / SAMPLE_INTERVAL_MINUTES;

/// Largest accepted gap between the interval end we asked for and the one returned.
const MAX_INTERVAL_SKEW_SECS: i64 = 60;

/// Enlighten v4 telemetry client.
#[derive(Clone)]
pub struct EnphaseMeteringProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl EnphaseMeteringProvider {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url,
            api_key,
            client: http::client(timeout)?,
        })
    }

    async fn telemetry<T: DeserializeOwned>(
        &self,
        system_id: SystemId,
        access_token: &str,
        meter: &str,
        start: DateTime<Utc>,
    ) -> Result<T> {
        let url = format!(
            "{}/api/v4/systems/{}/telemetry/{}",
            self.base_url.trim_end_matches('/'),
            system_id,
            meter
        );
        let resp = self
            .client
            .get(url)
            .query(&[
                ("start_at", start.timestamp().to_string()),
                ("granularity", "15mins".to_string()),
            ])
            .bearer_auth(access_token)
            .header("key", &self.api_key)
            .send()
            .await
            .with_context(|| format!("{meter} GET failed"))?;
        let body = http::success_body(resp, meter).await?;
        serde_json::from_str(&body).with_context(|| format!("{meter} JSON parse failed"))
    }
}

#[async_trait]
impl MeteringProvider for EnphaseMeteringProvider {
    async fn fetch_production(
        &self,
        system_id: SystemId,
        access_token: &str,
        start: DateTime<Utc>,
    ) -> Result<i64> {
        let body: ProductionResponse = self
            .telemetry(system_id, access_token, "production_meter", start)
            .await?;
        let interval = matching_interval(&body.intervals, |i: &ProductionInterval| i.end_at, body.start_at, start)?;
        Ok(interval.wh_del * WH_PER_INTERVAL_TO_WATTS)
    }

    async fn fetch_consumption(
        &self,
        system_id: SystemId,
        access_token: &str,
        start: DateTime<Utc>,
    ) -> Result<i64> {
        let body: ConsumptionResponse = self
            .telemetry(system_id, access_token, "consumption_meter", start)
            .await?;
        let interval = matching_interval(&body.intervals, |i: &ConsumptionInterval| i.end_at, body.start_at, start)?;
        debug!(system_id, end_at = interval.end_at, enwh = interval.enwh, "consumption interval");
        Ok(interval.enwh * WH_PER_INTERVAL_TO_WATTS)
    }
}

/// Picks the interval closing the requested window. Upstream may return
/// later intervals too; only the first window is comparable across meters.
fn matching_interval<'a, T>(
    intervals: &'a [T],
    end_at: impl Fn(&T) -> i64,
    response_start: i64,
    start: DateTime<Utc>,
) -> Result<&'a T> {
    let first = intervals.first().context("no intervals returned")?;
    let expected_end = start.timestamp() + SAMPLE_INTERVAL_MINUTES * 60;
    intervals
        .iter()
        .find(|i| (end_at(i) - expected_end).abs() <= MAX_INTERVAL_SKEW_SECS)
        .with_context(|| format!("untrustworthy interval: [{}, {}]", response_start, end_at(first)))
}

#[derive(Debug, Deserialize)]
struct ProductionResponse {
    #[serde(default)]
    start_at: i64,
    #[serde(default)]
    intervals: Vec<ProductionInterval>,
}

#[derive(Debug, Deserialize)]
struct ProductionInterval {
    end_at: i64,
    /// Watt-hours delivered during the interval.
    wh_del: i64,
}

#[derive(Debug, Deserialize)]
struct ConsumptionResponse {
    #[serde(default)]
    start_at: i64,
    #[serde(default)]
    intervals: Vec<ConsumptionInterval>,
}

#[derive(Debug, Deserialize)]
struct ConsumptionInterval {
    end_at: i64,
    enwh: i64,
}
