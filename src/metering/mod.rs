//! Production/consumption telemetry for one system per evaluation cycle.

pub mod daylight;
pub mod enphase;
pub mod source;

pub use daylight::DaylightWindow;
pub use enphase::EnphaseMeteringProvider;
pub use source::MeteringSource;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::SystemId;

/// Why a cycle got no sample.
///
/// Cloneable so that every sink sharing a memoized fetch sees the same error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeteringError {
    /// Not a fault: the read was deliberately not made.
    #[error("meter query skipped: {0}")]
    Skipped(String),
    #[error("{0}")]
    Failure(String),
}

/// Upstream telemetry API.
///
/// Values are average watts over the 15-minute interval starting at `start`;
/// implementations convert the provider's interval watt-hours.
#[async_trait]
pub trait MeteringProvider: Send + Sync {
    async fn fetch_production(
        &self,
        system_id: SystemId,
        access_token: &str,
        start: DateTime<Utc>,
    ) -> Result<i64>;

    async fn fetch_consumption(
        &self,
        system_id: SystemId,
        access_token: &str,
        start: DateTime<Utc>,
    ) -> Result<i64>;
}
