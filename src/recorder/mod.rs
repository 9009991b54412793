//! Append-only per-sink action log.
//!
//! The log is also the cooldown state: each cycle reads a sink's recent
//! records back before deciding anything.

#[cfg(feature = "db")]
pub mod pg;

#[cfg(feature = "db")]
pub use pg::PgActionStore;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::domain::{ActionRecord, SinkId};

#[async_trait]
pub trait ActionStore: Send + Sync {
    async fn record_action(&self, record: &ActionRecord) -> Result<()>;

    /// Up to `limit` records for `sink_id`, newest first.
    async fn recent_actions(&self, sink_id: SinkId, limit: usize) -> Result<Vec<ActionRecord>>;
}

/// Process-local store; history is lost on restart.
#[derive(Default)]
pub struct InMemoryActionStore {
    records: RwLock<HashMap<SinkId, Vec<ActionRecord>>>,
}

impl InMemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ActionStore for InMemoryActionStore {
    async fn record_action(&self, record: &ActionRecord) -> Result<()> {
        self.records
            .write()
            .entry(record.sink_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn recent_actions(&self, sink_id: SinkId, limit: usize) -> Result<Vec<ActionRecord>> {
        let records = self.records.read();
        let Some(log) = records.get(&sink_id) else {
            return Ok(Vec::new());
        };
        // Stable sort: records sharing a timestamp stay latest-appended first.
        let mut recent: Vec<ActionRecord> = log.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);
        Ok(recent)
    }
}
