//! # Cooldown / hysteresis
//!
//! Decides whether a desired action may actually be executed given the sink's
//! recorded history. There is no in-memory state: the most recent successful
//! mutative record in the action log is the state, so a restarted process
//! picks up exactly where it left off.
//!
//! The intervals are asymmetric. Switching from a consume hint to a produce
//! hint is allowed immediately, while every other transition waits. The
//! asymmetry is long-standing business policy and is kept as is.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Action, ActionRecord, ChannelKind};

/// Minimum elapsed time per transition, keyed by the last executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownThresholds {
    pub min_consume_to_consume: Duration,
    pub min_produce_to_consume: Duration,
    pub min_produce_to_produce: Duration,
}

impl CooldownThresholds {
    pub fn from_minutes(consume_to_consume: i64, produce_to_consume: i64, produce_to_produce: i64) -> Self {
        Self {
            min_consume_to_consume: Duration::minutes(consume_to_consume),
            min_produce_to_consume: Duration::minutes(produce_to_consume),
            min_produce_to_produce: Duration::minutes(produce_to_produce),
        }
    }

    /// Message channels. Each interval is 15 minutes short of a round number of
    /// hours to absorb trigger tick jitter.
    pub fn messaging() -> Self {
        Self::from_minutes(4 * 60 - 15, 2 * 60 - 15, 4 * 60 - 15)
    }

    /// Thermostat holds last a couple of hours, so re-issuing sooner is pointless.
    pub fn thermostat() -> Self {
        Self::from_minutes(2 * 60 - 15, 60 - 15, 2 * 60 - 15)
    }
}

/// The newest action that actually changed sink behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastAction {
    pub action: Action,
    pub timestamp: DateTime<Utc>,
}

/// Scans newest-first history for the latest successful `Produce`/`Consume`.
///
/// Failed attempts and `None`/`Info` records never count.
pub fn last_mutative_action(history: &[ActionRecord]) -> Option<LastAction> {
    history
        .iter()
        .find(|r| r.success && r.executed.is_mutative())
        .map(|r| LastAction {
            action: r.executed,
            timestamp: r.timestamp,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    thresholds: CooldownThresholds,
}

impl CooldownPolicy {
    pub fn new(thresholds: CooldownThresholds) -> Self {
        Self { thresholds }
    }

    /// Turns the desired action into the executed one.
    ///
    /// `history` must be newest first. `now` is explicit so the function stays
    /// pure.
    pub fn reconcile(
        &self,
        desired: Action,
        history: &[ActionRecord],
        now: DateTime<Utc>,
    ) -> (Action, String) {
        let Some(last) = last_mutative_action(history) else {
            return (desired, "no prior actions".to_string());
        };
        let since = now - last.timestamp;
        let t = &self.thresholds;

        match (desired, last.action) {
            (Action::Consume, Action::Consume) => gate(desired, last.action, since, t.min_consume_to_consume),
            (Action::Consume, Action::Produce) => gate(desired, last.action, since, t.min_produce_to_consume),
            (Action::Produce, Action::Consume) => (
                Action::Produce,
                format!(
                    "{} since last action ({}), switching to produce has no cooldown",
                    describe(since),
                    last.action
                ),
            ),
            (Action::Produce, Action::Produce) => gate(desired, last.action, since, t.min_produce_to_produce),
            _ => (desired, String::new()),
        }
    }

    /// Shortest cooldown of any transition out of `last`.
    pub fn min_interval_after(&self, last: Action) -> Duration {
        let t = &self.thresholds;
        match last {
            // consume -> produce is never throttled
            Action::Consume => Duration::zero(),
            Action::Produce => t.min_produce_to_consume.min(t.min_produce_to_produce),
            Action::None | Action::Info => Duration::zero(),
        }
    }

    /// Cheap check made before metering: returns a reason when no transition
    /// could be allowed yet, whatever the sample turns out to be.
    pub fn precheck(&self, history: &[ActionRecord], now: DateTime<Utc>) -> Option<String> {
        let last = last_mutative_action(history)?;
        let since = now - last.timestamp;
        (since < self.min_interval_after(last.action)).then(|| {
            format!(
                "time since last action ({}) is {} which is too recent",
                last.action,
                describe(since)
            )
        })
    }
}

fn gate(desired: Action, last: Action, since: Duration, min: Duration) -> (Action, String) {
    if since > min {
        (desired, format!("{} since last action ({last})", describe(since)))
    } else {
        (
            Action::None,
            format!("{} since last action ({last}), too recent", describe(since)),
        )
    }
}

fn describe(d: Duration) -> String {
    format!("{}h{:02}m", d.num_hours(), d.num_minutes().rem_euclid(60))
}

/// Cooldown policies for every channel kind that has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cooldowns {
    pub sms: CooldownPolicy,
    pub email: CooldownPolicy,
    pub ecobee: CooldownPolicy,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self {
            sms: CooldownPolicy::new(CooldownThresholds::messaging()),
            email: CooldownPolicy::new(CooldownThresholds::messaging()),
            ecobee: CooldownPolicy::new(CooldownThresholds::thermostat()),
        }
    }
}

impl Cooldowns {
    /// `None` for channels that bypass cooldowns entirely.
    pub fn policy_for(&self, kind: ChannelKind) -> Option<&CooldownPolicy> {
        match kind {
            ChannelKind::Sms => Some(&self.sms),
            ChannelKind::Email => Some(&self.email),
            ChannelKind::Ecobee => Some(&self.ecobee),
            ChannelKind::Logger => None,
        }
    }

    pub fn reconcile(
        &self,
        kind: ChannelKind,
        desired: Action,
        history: &[ActionRecord],
        now: DateTime<Utc>,
    ) -> (Action, String) {
        match self.policy_for(kind) {
            Some(policy) => policy.reconcile(desired, history, now),
            None => (desired, format!("{kind} sinks have no cooldown")),
        }
    }

    pub fn precheck(&self, kind: ChannelKind, history: &[ActionRecord], now: DateTime<Utc>) -> Option<String> {
        self.policy_for(kind)?.precheck(history, now)
    }
}
