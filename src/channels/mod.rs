//! Channel executors: one side-effecting delivery implementation per sink kind.

pub mod ecobee;
pub mod email;
pub mod logger;
pub mod message;
pub mod sendgrid;
pub mod sms;
pub mod thermostat;

pub use ecobee::EcobeeExecutor;
pub use email::EmailExecutor;
pub use logger::LoggerExecutor;
pub use message::{MessageSender, UnconfiguredSender};
pub use sendgrid::SendGridSender;
pub use sms::SmsExecutor;
pub use thermostat::{EcobeeClient, HoldSetting, ThermostatClient};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{Action, ActionResult, ChannelKind, Decision, Sample, Sink};

/// What the engine knew about the system when it made the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleContext {
    Metered(Sample),
    /// Metering failed; carries the failure message.
    Unavailable(String),
}

impl SampleContext {
    pub fn sample(&self) -> Option<&Sample> {
        match self {
            SampleContext::Metered(sample) => Some(sample),
            SampleContext::Unavailable(_) => None,
        }
    }
}

/// Delivers an already reconciled decision to one sink.
///
/// Implementations never fail the cycle: provider errors come back as
/// `success = false` with the reason.
#[async_trait]
pub trait ChannelExecutor: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn execute(&self, sink: &Sink, decision: Decision, context: &SampleContext) -> ActionResult;
}

/// Executors keyed by the channel kind they serve.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<ChannelKind, Arc<dyn ChannelExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `executor` under its own kind, replacing any previous one.
    pub fn register(mut self, executor: Arc<dyn ChannelExecutor>) -> Self {
        self.executors.insert(executor.kind(), executor);
        self
    }

    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn ChannelExecutor>> {
        self.executors.get(&kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = ChannelKind> + '_ {
        self.executors.keys().copied()
    }
}

/// Diagnostic sent on `Info` actions.
pub(crate) const METERING_UNAVAILABLE_SUBJECT: &str = "Error communicating with Enlighten";

pub(crate) const METERING_UNAVAILABLE_BODY: &str = "Attention: we are currently unable to reach the \
    metering API for production and consumption data from your system.";

/// Subject and body for a message-style sink, or `None` when nothing is sent.
pub(crate) fn compose_message(
    decision: &Decision,
    context: &SampleContext,
    public_hostname: &str,
) -> Option<(String, String)> {
    match (decision.executed, context.sample()) {
        (Action::Info, _) => Some((
            METERING_UNAVAILABLE_SUBJECT.to_string(),
            METERING_UNAVAILABLE_BODY.to_string(),
        )),
        (Action::Consume, Some(sample)) => Some((
            "Your solar panels are overproducing - time to increase usage.".to_string(),
            format!(
                "Over the last 15 minutes your solar panels produced {} Watts of electricity, \
                 but your home only consumed {} Watts. Consider increasing usage! \
                 Visit https://{public_hostname}/tips/consume for tips.",
                sample.produced_watts, sample.consumed_watts
            ),
        )),
        (Action::Produce, Some(sample)) => Some((
            "Your solar panels are underproducing - time to reduce usage.".to_string(),
            format!(
                "Over the last 15 minutes your solar panels produced {} Watts of electricity, \
                 but your home consumed {} Watts. Consider reducing usage! \
                 Visit https://{public_hostname}/tips/reduce for tips.",
                sample.produced_watts, sample.consumed_watts
            ),
        )),
        _ => None,
    }
}
