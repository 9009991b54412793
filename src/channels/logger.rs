use async_trait::async_trait;
use tracing::info;

use super::{ChannelExecutor, SampleContext};
use crate::domain::{ActionResult, ChannelKind, Decision, Sink};

/// Writes the decision to the structured log. No I/O, never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerExecutor;

#[async_trait]
impl ChannelExecutor for LoggerExecutor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Logger
    }

    async fn execute(&self, sink: &Sink, decision: Decision, context: &SampleContext) -> ActionResult {
        let sample = context.sample();
        info!(
            sink_id = sink.id,
            system_id = sink.system_id,
            desired = %decision.desired,
            executed = %decision.executed,
            produced_watts = sample.map(|s| s.produced_watts),
            consumed_watts = sample.map(|s| s.consumed_watts),
            net_watts = sample.map(|s| s.net_watts()),
            reason = %decision.desired_reason,
            "power sink action"
        );
        decision.succeeded("")
    }
}
