use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;
use validator::ValidateEmail;

pub type SinkId = i64;
pub type SystemId = i64;

/// Sink configuration errors, raised when a sink is created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("unsupported channel: {0:?}")]
    UnknownChannel(String),
    #[error("'recipient' is required for {0} sinks")]
    MissingRecipient(ChannelKind),
    #[error("invalid {kind} recipient {recipient:?}: {reason}")]
    InvalidRecipient {
        kind: ChannelKind,
        recipient: String,
        reason: &'static str,
    },
}

/// Delivery channel of a power sink.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChannelKind {
    Sms,
    Email,
    Ecobee,
    Logger,
}

impl ChannelKind {
    pub fn parse(s: &str) -> Result<Self, SinkError> {
        s.trim()
            .parse()
            .map_err(|_| SinkError::UnknownChannel(s.to_string()))
    }

    /// Ecobee recipients arrive later through the OAuth callback, so only
    /// message channels need one up front.
    pub fn requires_recipient(self) -> bool {
        matches!(self, ChannelKind::Sms | ChannelKind::Email)
    }

    /// Logger output cannot be spammed, so it never goes through a cooldown.
    pub fn has_cooldown(self) -> bool {
        !matches!(self, ChannelKind::Logger)
    }

    /// Whether an `Info` diagnostic means anything on this channel.
    pub fn supports_info(self) -> bool {
        !matches!(self, ChannelKind::Ecobee)
    }
}

/// A configured destination for power-balancing actions of one system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sink {
    pub id: SinkId,
    pub user_id: String,
    pub system_id: SystemId,
    pub channel: ChannelKind,
    pub recipient: Option<String>,
    pub created: DateTime<Utc>,
}

impl Sink {
    /// Validates the recipient against the channel's requirements.
    pub fn new(
        id: SinkId,
        user_id: impl Into<String>,
        system_id: SystemId,
        channel: ChannelKind,
        recipient: Option<String>,
    ) -> Result<Self, SinkError> {
        let recipient = recipient
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        validate_recipient(channel, recipient.as_deref())?;

        Ok(Self {
            id,
            user_id: user_id.into(),
            system_id,
            channel,
            recipient,
            created: Utc::now(),
        })
    }

    /// Replaces the recipient, e.g. after a thermostat token refresh.
    pub fn rotate_recipient(&mut self, recipient: String) -> Result<(), SinkError> {
        validate_recipient(self.channel, Some(&recipient))?;
        self.recipient = Some(recipient);
        Ok(())
    }
}

fn validate_recipient(channel: ChannelKind, recipient: Option<&str>) -> Result<(), SinkError> {
    let Some(recipient) = recipient else {
        return if channel.requires_recipient() {
            Err(SinkError::MissingRecipient(channel))
        } else {
            Ok(())
        };
    };

    let invalid = |reason| SinkError::InvalidRecipient {
        kind: channel,
        recipient: recipient.to_string(),
        reason,
    };

    match channel {
        ChannelKind::Email if !recipient.validate_email() => Err(invalid("not an email address")),
        ChannelKind::Sms if !is_phone_number(recipient) => Err(invalid("not a phone number")),
        _ => Ok(()),
    }
}

fn is_phone_number(s: &str) -> bool {
    let digits = s.strip_prefix('+').unwrap_or(s);
    let mut count = 0;
    for c in digits.chars() {
        match c {
            '0'..='9' => count += 1,
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => return false,
        }
    }
    (7..=15).contains(&count)
}

/// A metered solar installation and the credential used to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolarSystem {
    pub user_id: String,
    pub system_id: SystemId,
    /// IANA zone name, e.g. `America/New_York`.
    pub timezone: String,
    #[serde(skip_serializing)]
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_channel_capabilities() {
        assert!(ChannelKind::Email.requires_recipient());
        assert!(ChannelKind::Sms.requires_recipient());
        assert!(!ChannelKind::Ecobee.requires_recipient());
        assert!(!ChannelKind::Logger.requires_recipient());

        assert!(!ChannelKind::Logger.has_cooldown());
        assert!(!ChannelKind::Ecobee.supports_info());

        let names: Vec<String> = ChannelKind::iter().map(|k| k.to_string()).collect();
        assert_eq!(names, ["sms", "email", "ecobee", "logger"]);
    }

    #[test]
    fn test_parse_channel() {
        assert_eq!(ChannelKind::parse(" Email ").unwrap(), ChannelKind::Email);
        assert_eq!(
            ChannelKind::parse("pager"),
            Err(SinkError::UnknownChannel("pager".into()))
        );
    }

    #[test]
    fn test_message_sinks_require_recipient() {
        let err = Sink::new(1, "u1", 10, ChannelKind::Email, Some("   ".into())).unwrap_err();
        assert_eq!(err, SinkError::MissingRecipient(ChannelKind::Email));

        let err = Sink::new(1, "u1", 10, ChannelKind::Sms, None).unwrap_err();
        assert_eq!(err, SinkError::MissingRecipient(ChannelKind::Sms));
    }

    #[test]
    fn test_recipient_format_is_checked() {
        assert!(matches!(
            Sink::new(1, "u1", 10, ChannelKind::Email, Some("not-an-address".into())),
            Err(SinkError::InvalidRecipient { .. })
        ));
        assert!(matches!(
            Sink::new(1, "u1", 10, ChannelKind::Sms, Some("call me".into())),
            Err(SinkError::InvalidRecipient { .. })
        ));

        let sink = Sink::new(1, "u1", 10, ChannelKind::Sms, Some("+1 (555) 010-4477".into())).unwrap();
        assert_eq!(sink.recipient.as_deref(), Some("+1 (555) 010-4477"));
    }

    #[test]
    fn test_logger_and_ecobee_accept_no_recipient() {
        let logger = Sink::new(2, "u1", 10, ChannelKind::Logger, None).unwrap();
        assert!(logger.recipient.is_none());

        let mut ecobee = Sink::new(3, "u1", 10, ChannelKind::Ecobee, None).unwrap();
        ecobee.rotate_recipient("token-abc".into()).unwrap();
        assert_eq!(ecobee.recipient.as_deref(), Some("token-abc"));
    }
}
