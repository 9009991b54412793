use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::{ActionResult, ChannelKind, Decision, Sink};

/// Transport for human-readable notifications (email, SMS).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Stand-in for a channel whose transport has no credentials configured.
///
/// Sinks on that channel still run through the pipeline and record a failed
/// delivery instead of silently succeeding.
#[derive(Debug, Clone)]
pub struct UnconfiguredSender {
    transport: &'static str,
}

impl UnconfiguredSender {
    pub fn new(transport: &'static str) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl MessageSender for UnconfiguredSender {
    async fn send_message(&self, _recipient: &str, _subject: &str, _body: &str) -> Result<()> {
        anyhow::bail!("{} transport is not configured", self.transport)
    }
}

/// Sends `message` to the sink's recipient; `None` means there is nothing to say.
pub(crate) async fn deliver(
    sender: &dyn MessageSender,
    kind: ChannelKind,
    sink: &Sink,
    decision: Decision,
    message: Option<(String, String)>,
) -> ActionResult {
    let Some((subject, body)) = message else {
        return decision.succeeded("");
    };
    let Some(recipient) = sink.recipient.as_deref() else {
        return decision.failed(format!("no recipient configured for {kind} sink {}", sink.id));
    };

    match sender.send_message(recipient, &subject, &body).await {
        Ok(()) => {
            info!(sink_id = sink.id, action = %decision.executed, "sent {kind}");
            decision.succeeded(format!("sent {kind} to {recipient:?}"))
        }
        Err(e) => {
            warn!(sink_id = sink.id, action = %decision.executed, error = %e, "{kind} delivery failed");
            decision.failed(format!("failed to send {kind} to {recipient:?}: {e:#}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_sender_always_fails() {
        let err = UnconfiguredSender::new("sms")
            .send_message("+15550100", "s", "b")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "sms transport is not configured");
    }
}
