use async_trait::async_trait;
use std::sync::Arc;

use super::message::deliver;
use super::{compose_message, ChannelExecutor, MessageSender, SampleContext};
use crate::domain::{ActionResult, ChannelKind, Decision, Sink};

pub struct EmailExecutor {
    sender: Arc<dyn MessageSender>,
    public_hostname: String,
}

impl EmailExecutor {
    pub fn new(sender: Arc<dyn MessageSender>, public_hostname: impl Into<String>) -> Self {
        Self {
            sender,
            public_hostname: public_hostname.into(),
        }
    }
}

#[async_trait]
impl ChannelExecutor for EmailExecutor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn execute(&self, sink: &Sink, decision: Decision, context: &SampleContext) -> ActionResult {
        let message = compose_message(&decision, context, &self.public_hostname);
        deliver(self.sender.as_ref(), ChannelKind::Email, sink, decision, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::message::MockMessageSender;
    use crate::channels::test_support::*;
    use crate::domain::Action;

    fn executor(sender: MockMessageSender) -> EmailExecutor {
        EmailExecutor::new(Arc::new(sender), "nudge.example.com")
    }

    #[tokio::test]
    async fn test_consume_sends_one_email() {
        let mut sender = MockMessageSender::new();
        sender
            .expect_send_message()
            .withf(|to, subject, body| {
                to.contains("owner@example.com") && subject.contains("overproducing") && body.contains("3000")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let result = executor(sender)
            .execute(
                &sink(ChannelKind::Email, Some("owner@example.com")),
                decision(Action::Consume, Action::Consume),
                &metered(3000, 1500),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.executed, Action::Consume);
        assert_eq!(result.success_reason, "sent email to \"owner@example.com\"");
    }

    #[tokio::test]
    async fn test_none_sends_nothing() {
        let mut sender = MockMessageSender::new();
        sender.expect_send_message().never();

        let result = executor(sender)
            .execute(
                &sink(ChannelKind::Email, Some("owner@example.com")),
                decision(Action::Consume, Action::None),
                &metered(3000, 1500),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.executed, Action::None);
    }

    #[tokio::test]
    async fn test_info_sends_diagnostic() {
        let mut sender = MockMessageSender::new();
        sender
            .expect_send_message()
            .withf(|_, subject, _| subject.contains("Enlighten"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let result = executor(sender)
            .execute(
                &sink(ChannelKind::Email, Some("owner@example.com")),
                decision(Action::Info, Action::Info),
                &SampleContext::Unavailable("HTTP 503".into()),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.executed, Action::Info);
    }

    #[tokio::test]
    async fn test_send_failure_is_reported_not_raised() {
        let mut sender = MockMessageSender::new();
        sender
            .expect_send_message()
            .returning(|_, _, _| Err(anyhow::anyhow!("mailbox unavailable")));

        let result = executor(sender)
            .execute(
                &sink(ChannelKind::Email, Some("owner@example.com")),
                decision(Action::Produce, Action::Produce),
                &metered(0, 2500),
            )
            .await;
        assert!(!result.success);
        assert!(result.success_reason.contains("mailbox unavailable"));
        assert_eq!(result.executed, Action::Produce);
    }

    #[tokio::test]
    async fn test_missing_recipient_fails_without_sending() {
        let mut sender = MockMessageSender::new();
        sender.expect_send_message().never();

        let result = executor(sender)
            .execute(
                &sink(ChannelKind::Email, None),
                decision(Action::Consume, Action::Consume),
                &metered(3000, 0),
            )
            .await;
        assert!(!result.success);
        assert!(result.success_reason.contains("no recipient"));
    }
}
