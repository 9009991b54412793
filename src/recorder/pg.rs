#![cfg(feature = "db")]

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use super::ActionStore;
use crate::domain::{Action, ActionRecord, SinkId};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ActionRow {
    sink_id: i64,
    timestamp: DateTime<Utc>,
    desired: String,
    desired_reason: String,
    executed: String,
    executed_reason: String,
    success: bool,
    success_reason: String,
}

impl TryFrom<ActionRow> for ActionRecord {
    type Error = anyhow::Error;

    fn try_from(row: ActionRow) -> Result<Self> {
        let parse = |s: &str| {
            s.parse::<Action>()
                .with_context(|| format!("unknown action {s:?} in actions_log"))
        };
        Ok(Self {
            sink_id: row.sink_id,
            timestamp: row.timestamp,
            desired: parse(&row.desired)?,
            desired_reason: row.desired_reason,
            executed: parse(&row.executed)?,
            executed_reason: row.executed_reason,
            success: row.success,
            success_reason: row.success_reason,
        })
    }
}

/// `actions_log` table in Postgres.
pub struct PgActionStore {
    pool: PgPool,
}

impl PgActionStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("failed to connect to postgres")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")
    }
}

#[async_trait]
impl ActionStore for PgActionStore {
    async fn record_action(&self, record: &ActionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO actions_log (sink_id, timestamp, desired, desired_reason, executed, executed_reason, success, success_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.sink_id)
        .bind(record.timestamp)
        .bind(record.desired.as_ref())
        .bind(&record.desired_reason)
        .bind(record.executed.as_ref())
        .bind(&record.executed_reason)
        .bind(record.success)
        .bind(&record.success_reason)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to record action for sink {}", record.sink_id))?;
        Ok(())
    }

    async fn recent_actions(&self, sink_id: SinkId, limit: usize) -> Result<Vec<ActionRecord>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT sink_id, timestamp, desired, desired_reason, executed, executed_reason, success, success_reason
            FROM actions_log
            WHERE sink_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(sink_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to query actions for sink {sink_id}"))?;

        rows.into_iter().map(ActionRecord::try_from).collect()
    }
}
