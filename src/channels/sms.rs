use async_trait::async_trait;
use std::sync::Arc;

use super::message::deliver;
use super::{ChannelExecutor, MessageSender, SampleContext};
use crate::domain::{Action, ActionResult, ChannelKind, Decision, Sink};

/// Text messages have no subject line, so the whole nudge fits in the body.
pub struct SmsExecutor {
    sender: Arc<dyn MessageSender>,
}

impl SmsExecutor {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self { sender }
    }
}

fn compose_text(decision: &Decision, context: &SampleContext) -> Option<(String, String)> {
    let text = match (decision.executed, context.sample()) {
        (Action::Info, _) => "We can't reach the metering API for your solar system right now.".to_string(),
        (Action::Consume, Some(s)) => format!(
            "Solar surplus: {} W produced, {} W used. Good time to increase usage.",
            s.produced_watts, s.consumed_watts
        ),
        (Action::Produce, Some(s)) => format!(
            "Solar deficit: {} W produced, {} W used. Consider reducing usage.",
            s.produced_watts, s.consumed_watts
        ),
        _ => return None,
    };
    Some((String::new(), text))
}

#[async_trait]
impl ChannelExecutor for SmsExecutor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn execute(&self, sink: &Sink, decision: Decision, context: &SampleContext) -> ActionResult {
        let message = compose_text(&decision, context);
        deliver(self.sender.as_ref(), ChannelKind::Sms, sink, decision, message).await
    }
}
