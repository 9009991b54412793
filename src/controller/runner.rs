use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::catalog::SinkCatalog;
use crate::channels::{ExecutorRegistry, SampleContext};
use crate::decision::{decide, Cooldowns};
use crate::domain::{Action, ActionRecord, ActionResult, ChannelKind, Decision, Sink, SinkId, SolarSystem, SystemId};
use crate::metering::{DaylightWindow, MeteringError, MeteringProvider, MeteringSource};
use crate::recorder::ActionStore;

/// Knobs for one evaluation pass.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Upper bound on a single sink delivery.
    pub send_timeout: Duration,
    /// How many records of history the cooldown policy gets to see.
    pub history_depth: usize,
    pub daylight: DaylightWindow,
    pub cooldowns: Cooldowns,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(30),
            history_depth: 20,
            daylight: DaylightWindow::default(),
            cooldowns: Cooldowns::default(),
        }
    }
}

/// Terminal state of one sink's pipeline in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SinkOutcome {
    /// Executed (successfully or not) and appended to the action log.
    Recorded { result: ActionResult },
    /// Deliberately not evaluated this cycle; nothing was written.
    Skipped { reason: String },
    /// The pipeline broke down; `result` is set when execution happened but
    /// the record could not be persisted.
    Dropped {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<ActionResult>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SinkReport {
    pub sink_id: SinkId,
    pub system_id: SystemId,
    pub channel: ChannelKind,
    #[serde(flatten)]
    pub outcome: SinkOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub systems: usize,
    pub recorded: usize,
    pub skipped: usize,
    pub dropped: usize,
    pub sinks: Vec<SinkReport>,
    /// Failures that prevented whole systems from being evaluated.
    pub errors: Vec<String>,
}

impl CycleReport {
    fn new(cycle_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            started_at,
            systems: 0,
            recorded: 0,
            skipped: 0,
            dropped: 0,
            sinks: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn push(&mut self, report: SinkReport) {
        match report.outcome {
            SinkOutcome::Recorded { .. } => self.recorded += 1,
            SinkOutcome::Skipped { .. } => self.skipped += 1,
            SinkOutcome::Dropped { .. } => self.dropped += 1,
        }
        self.sinks.push(report);
    }

    pub fn outcome_for(&self, sink_id: SinkId) -> Option<&SinkOutcome> {
        self.sinks.iter().find(|s| s.sink_id == sink_id).map(|s| &s.outcome)
    }
}

/// Runs history, pre-check, metering, decision, cooldown, delivery and
/// recording for every sink of every active system.
///
/// Holds no state between cycles; everything it remembers lives in the
/// [`ActionStore`].
pub struct CycleRunner {
    catalog: Arc<dyn SinkCatalog>,
    metering: Arc<dyn MeteringProvider>,
    store: Arc<dyn ActionStore>,
    executors: ExecutorRegistry,
    settings: CycleSettings,
}

impl CycleRunner {
    pub fn new(
        catalog: Arc<dyn SinkCatalog>,
        metering: Arc<dyn MeteringProvider>,
        store: Arc<dyn ActionStore>,
        executors: ExecutorRegistry,
    ) -> Self {
        Self::with_settings(catalog, metering, store, executors, CycleSettings::default())
    }

    pub fn with_settings(
        catalog: Arc<dyn SinkCatalog>,
        metering: Arc<dyn MeteringProvider>,
        store: Arc<dyn ActionStore>,
        executors: ExecutorRegistry,
        settings: CycleSettings,
    ) -> Self {
        Self {
            catalog,
            metering,
            store,
            executors,
            settings,
        }
    }

    /// One full pass as if the clock read `now`.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", %cycle_id);
        async move {
            let mut report = CycleReport::new(cycle_id, now);

            let systems = match self.catalog.active_systems().await {
                Ok(systems) => systems,
                Err(e) => {
                    error!(error = %e, "failed to list active systems");
                    report.errors.push(format!("failed to list active systems: {e:#}"));
                    return report;
                }
            };
            report.systems = systems.len();

            let per_system = join_all(systems.into_iter().map(|system| self.run_system(system, now))).await;
            for outcome in per_system {
                match outcome {
                    Ok(sinks) => sinks.into_iter().for_each(|s| report.push(s)),
                    Err(e) => report.errors.push(e),
                }
            }

            info!(
                systems = report.systems,
                recorded = report.recorded,
                skipped = report.skipped,
                dropped = report.dropped,
                "cycle complete"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn run_system(&self, system: SolarSystem, now: DateTime<Utc>) -> Result<Vec<SinkReport>, String> {
        let sinks = self
            .catalog
            .sinks_for_system(&system.user_id, system.system_id)
            .await
            .map_err(|e| {
                warn!(system_id = system.system_id, error = %e, "failed to list sinks");
                format!("failed to list sinks for system {}: {e:#}", system.system_id)
            })?;
        if sinks.is_empty() {
            debug!(system_id = system.system_id, "system has no sinks");
            return Ok(Vec::new());
        }

        // Shared by every sink of this system; at most one upstream round.
        let source = MeteringSource::new(self.metering.clone(), system, self.settings.daylight, now);

        Ok(join_all(sinks.iter().map(|sink| {
            let span = info_span!("sink", sink_id = sink.id, system_id = sink.system_id, channel = %sink.channel);
            self.run_sink(sink, &source, now).instrument(span)
        }))
        .await)
    }

    async fn run_sink(&self, sink: &Sink, source: &MeteringSource, now: DateTime<Utc>) -> SinkReport {
        let outcome = self.evaluate_sink(sink, source, now).await;
        match &outcome {
            SinkOutcome::Recorded { result } => info!(
                desired = %result.desired,
                executed = %result.executed,
                success = result.success,
                "sink action recorded"
            ),
            SinkOutcome::Skipped { reason } => debug!(%reason, "sink skipped"),
            SinkOutcome::Dropped { reason, .. } => warn!(%reason, "sink dropped"),
        }
        SinkReport {
            sink_id: sink.id,
            system_id: sink.system_id,
            channel: sink.channel,
            outcome,
        }
    }

    async fn evaluate_sink(&self, sink: &Sink, source: &MeteringSource, now: DateTime<Utc>) -> SinkOutcome {
        let kind = sink.channel;
        let Some(executor) = self.executors.get(kind) else {
            return SinkOutcome::Dropped {
                reason: format!("no executor registered for {kind} sinks"),
                result: None,
            };
        };

        let history = match self.store.recent_actions(sink.id, self.settings.history_depth).await {
            Ok(history) => history,
            Err(e) => {
                return SinkOutcome::Dropped {
                    reason: format!("failed to read action history: {e:#}"),
                    result: None,
                }
            }
        };

        // Avoid touching the metering API when no action could be allowed anyway.
        if let Some(reason) = self.settings.cooldowns.precheck(kind, &history, now) {
            return SinkOutcome::Skipped { reason };
        }

        let (decision, context) = match source.fetch().await {
            Ok(sample) => {
                let (desired, desired_reason) = decide(sample.produced_watts, sample.consumed_watts);
                let (executed, executed_reason) = self.settings.cooldowns.reconcile(kind, desired, &history, now);
                let decision = Decision {
                    desired,
                    desired_reason,
                    executed,
                    executed_reason,
                };
                (decision, SampleContext::Metered(sample))
            }
            Err(e @ MeteringError::Skipped(_)) => return SinkOutcome::Skipped { reason: e.to_string() },
            Err(MeteringError::Failure(msg)) => (info_decision(kind, &msg), SampleContext::Unavailable(msg)),
        };

        let result = match tokio::time::timeout(
            self.settings.send_timeout,
            executor.execute(sink, decision.clone(), &context),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => decision.failed(format!(
                "delivery timed out after {}s",
                self.settings.send_timeout.as_secs_f64()
            )),
        };

        let record = ActionRecord::from_result(sink.id, now, &result);
        match self.store.record_action(&record).await {
            Ok(()) => SinkOutcome::Recorded { result },
            Err(e) => SinkOutcome::Dropped {
                reason: format!("failed to record action: {e:#}"),
                result: Some(result),
            },
        }
    }
}

/// Decision after a metering failure: tell the owner where the channel can.
fn info_decision(kind: ChannelKind, failure: &str) -> Decision {
    let (executed, executed_reason) = if kind.supports_info() {
        (Action::Info, String::new())
    } else {
        (Action::None, format!("info is not meaningful for {kind} sinks"))
    };
    Decision {
        desired: Action::Info,
        desired_reason: format!("failed to fetch meter data: {failure}"),
        executed,
        executed_reason,
    }
}
