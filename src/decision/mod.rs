//! Pure decision logic: threshold classification and cooldown reconciliation.

pub mod cooldown;

pub use cooldown::{last_mutative_action, CooldownPolicy, CooldownThresholds, Cooldowns, LastAction};

use crate::domain::Action;

/// Net imbalance, in watts, that justifies nudging a sink.
///
/// Deliberately independent of system capacity.
pub const EXCESS_THRESHOLD_WATTS: i64 = 1000;

/// More than 1 kW net export.
pub fn is_excess_production(produced: i64, consumed: i64) -> bool {
    produced.saturating_sub(consumed) > EXCESS_THRESHOLD_WATTS
}

/// More than 1 kW net import.
pub fn is_excess_consumption(produced: i64, consumed: i64) -> bool {
    consumed.saturating_sub(produced) > EXCESS_THRESHOLD_WATTS
}

/// Maps a sample to the action the engine would like to take and why.
pub fn decide(produced: i64, consumed: i64) -> (Action, String) {
    if is_excess_production(produced, consumed) {
        (
            Action::Consume,
            format!("{produced} production >> {consumed} consumption"),
        )
    } else if is_excess_consumption(produced, consumed) {
        (
            Action::Produce,
            format!("{consumed} consumption >> {produced} production"),
        )
    } else {
        (
            Action::None,
            format!("{produced} production ~= {consumed} consumption"),
        )
    }
}
