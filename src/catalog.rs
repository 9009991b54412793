//! Which systems are active and which sinks hang off each of them.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

use crate::domain::{ChannelKind, Sink, SinkError, SinkId, SolarSystem, SystemId};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    InvalidSink(#[from] SinkError),
    #[error("unknown system {0}")]
    UnknownSystem(SystemId),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Request to attach a new sink to a system.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSink {
    pub system_id: SystemId,
    pub channel: String,
    #[serde(default)]
    pub recipient: Option<String>,
}

#[async_trait]
pub trait SinkCatalog: Send + Sync {
    async fn active_systems(&self) -> Result<Vec<SolarSystem>>;

    async fn sinks_for_system(&self, user_id: &str, system_id: SystemId) -> Result<Vec<Sink>>;

    async fn find_sink(&self, id: SinkId) -> Result<Option<Sink>>;

    async fn add_sink(&self, new: NewSink) -> Result<Sink, CatalogError>;

    /// Returns whether a sink was removed. Its action log is kept.
    async fn remove_sink(&self, id: SinkId) -> Result<bool>;
}

/// In-memory catalog seeded at startup.
pub struct StaticSinkCatalog {
    systems: Vec<SolarSystem>,
    sinks: RwLock<Vec<Sink>>,
    next_id: AtomicI64,
}

impl StaticSinkCatalog {
    pub fn new(systems: Vec<SolarSystem>, sinks: Vec<Sink>) -> Self {
        let next_id = sinks.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        Self {
            systems,
            sinks: RwLock::new(sinks),
            next_id: AtomicI64::new(next_id),
        }
    }

    fn system(&self, system_id: SystemId) -> Option<&SolarSystem> {
        self.systems.iter().find(|s| s.system_id == system_id)
    }
}

#[async_trait]
impl SinkCatalog for StaticSinkCatalog {
    async fn active_systems(&self) -> Result<Vec<SolarSystem>> {
        Ok(self.systems.clone())
    }

    async fn sinks_for_system(&self, user_id: &str, system_id: SystemId) -> Result<Vec<Sink>> {
        Ok(self
            .sinks
            .read()
            .iter()
            .filter(|s| s.user_id == user_id && s.system_id == system_id)
            .cloned()
            .collect())
    }

    async fn find_sink(&self, id: SinkId) -> Result<Option<Sink>> {
        Ok(self.sinks.read().iter().find(|s| s.id == id).cloned())
    }

    async fn add_sink(&self, new: NewSink) -> Result<Sink, CatalogError> {
        let system = self
            .system(new.system_id)
            .ok_or(CatalogError::UnknownSystem(new.system_id))?;
        let channel = ChannelKind::parse(&new.channel)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let sink = Sink::new(id, system.user_id.clone(), system.system_id, channel, new.recipient)?;
        self.sinks.write().push(sink.clone());
        Ok(sink)
    }

    async fn remove_sink(&self, id: SinkId) -> Result<bool> {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|s| s.id != id);
        Ok(sinks.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StaticSinkCatalog {
        let system = SolarSystem {
            user_id: "user-1".into(),
            system_id: 42,
            timezone: "America/New_York".into(),
            access_token: "tok".into(),
        };
        let logger = Sink::new(3, "user-1", 42, ChannelKind::Logger, None).unwrap();
        StaticSinkCatalog::new(vec![system], vec![logger])
    }

    #[tokio::test]
    async fn test_add_sink_assigns_next_id() {
        let catalog = catalog();
        let sink = catalog
            .add_sink(NewSink {
                system_id: 42,
                channel: "email".into(),
                recipient: Some("owner@example.com".into()),
            })
            .await
            .unwrap();
        assert_eq!(sink.id, 4);
        assert_eq!(sink.user_id, "user-1");
        assert_eq!(catalog.sinks_for_system("user-1", 42).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_add_sink_validates() {
        let catalog = catalog();
        let err = catalog
            .add_sink(NewSink {
                system_id: 42,
                channel: "sms".into(),
                recipient: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::InvalidSink(SinkError::MissingRecipient(ChannelKind::Sms))
        ));

        let err = catalog
            .add_sink(NewSink {
                system_id: 7,
                channel: "logger".into(),
                recipient: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownSystem(7)));

        let err = catalog
            .add_sink(NewSink {
                system_id: 42,
                channel: "carrier-pigeon".into(),
                recipient: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidSink(SinkError::UnknownChannel(_))));
    }

    #[tokio::test]
    async fn test_remove_sink() {
        let catalog = catalog();
        assert!(catalog.remove_sink(3).await.unwrap());
        assert!(!catalog.remove_sink(3).await.unwrap());
        assert!(catalog.find_sink(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sinks_are_scoped_to_user_and_system() {
        let catalog = catalog();
        assert!(catalog.sinks_for_system("someone-else", 42).await.unwrap().is_empty());
        assert!(catalog.sinks_for_system("user-1", 43).await.unwrap().is_empty());
    }
}
