use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::SinkId;

/// What the engine asks a power sink to do.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Action {
    /// Maintain the status quo; nothing is delivered.
    None,
    /// Consumption outruns production: nudge toward using less.
    Produce,
    /// Production outruns consumption: nudge toward using more.
    Consume,
    /// Diagnostic message, e.g. the metering API is unreachable.
    Info,
}

impl Action {
    /// `Produce` and `Consume` try to change sink behaviour and are subject to cooldowns.
    pub fn is_mutative(self) -> bool {
        matches!(self, Action::Produce | Action::Consume)
    }
}

/// Desired and executed actions for one sink in one cycle, before delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub desired: Action,
    pub desired_reason: String,
    pub executed: Action,
    pub executed_reason: String,
}

impl Decision {
    pub fn succeeded(self, reason: impl Into<String>) -> ActionResult {
        self.finish(true, reason.into())
    }

    pub fn failed(self, reason: impl Into<String>) -> ActionResult {
        self.finish(false, reason.into())
    }

    fn finish(self, success: bool, success_reason: String) -> ActionResult {
        ActionResult {
            desired: self.desired,
            desired_reason: self.desired_reason,
            executed: self.executed,
            executed_reason: self.executed_reason,
            success,
            success_reason,
        }
    }
}

/// Outcome of delivering a [`Decision`] to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub desired: Action,
    pub desired_reason: String,
    pub executed: Action,
    pub executed_reason: String,
    pub success: bool,
    pub success_reason: String,
}

/// One immutable entry of a sink's action log.
///
/// The log doubles as the cooldown state machine: the next cycle's policy
/// reads it back newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub sink_id: SinkId,
    pub timestamp: DateTime<Utc>,
    pub desired: Action,
    pub desired_reason: String,
    pub executed: Action,
    pub executed_reason: String,
    pub success: bool,
    pub success_reason: String,
}

impl ActionRecord {
    pub fn from_result(sink_id: SinkId, timestamp: DateTime<Utc>, result: &ActionResult) -> Self {
        Self {
            sink_id,
            timestamp,
            desired: result.desired,
            desired_reason: result.desired_reason.clone(),
            executed: result.executed,
            executed_reason: result.executed_reason.clone(),
            success: result.success,
            success_reason: result.success_reason.clone(),
        }
    }
}
