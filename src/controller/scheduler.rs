use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::runner::{CycleReport, CycleRunner};

/// Bookkeeping across cycles, exposed by the health endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_recorded: usize,
    pub last_skipped: usize,
    pub last_dropped: usize,
}

/// Serializes cycles from the interval loop and the HTTP trigger.
///
/// Every cycle runs on its own task, so a caller that goes away (request
/// timeout, client disconnect) never cancels a cycle between a delivery and
/// its log entry.
pub struct CycleScheduler {
    runner: Arc<CycleRunner>,
    every: Duration,
    run_on_startup: bool,
    status: Arc<RwLock<TaskStatus>>,
    running: Arc<Mutex<()>>,
    stop: watch::Sender<bool>,
}

impl CycleScheduler {
    pub fn new(runner: Arc<CycleRunner>, every: Duration, run_on_startup: bool) -> Self {
        Self {
            runner,
            every,
            run_on_startup,
            status: Arc::new(RwLock::new(TaskStatus::default())),
            running: Arc::new(Mutex::new(())),
            stop: watch::Sender::new(false),
        }
    }

    /// Runs one cycle now, waiting for any cycle already in flight to finish.
    ///
    /// Dropping the returned future does not stop the cycle.
    pub async fn run_once(&self) -> Result<CycleReport> {
        let runner = self.runner.clone();
        let status = self.status.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            let _guard = running.lock_owned().await;

            let now = Utc::now();
            {
                let mut status = status.write().await;
                status.last_run = Some(now);
                status.run_count += 1;
            }

            let report = runner.run_cycle_at(now).await;

            let mut status = status.write().await;
            status.last_recorded = report.recorded;
            status.last_skipped = report.skipped;
            status.last_dropped = report.dropped;
            if report.errors.is_empty() {
                status.last_success = Some(now);
                status.success_count += 1;
                status.last_error = None;
            } else {
                status.error_count += 1;
                status.last_error = Some(report.errors.join("; "));
            }
            report
        })
        .await
        .context("cycle task failed")
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let mut stop = self.stop.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if !self.run_on_startup {
                // The first tick completes immediately.
                ticker.tick().await;
            }
            info!(every_secs = self.every.as_secs(), "cycle loop started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop.wait_for(|stopped| *stopped) => break,
                }
                match self.run_once().await {
                    Ok(report) if !report.errors.is_empty() => {
                        warn!(errors = ?report.errors, "cycle finished with errors");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "cycle aborted"),
                }
            }
            info!("cycle loop stopped");
        })
    }

    /// Stops the interval loop and waits for any cycle in flight to finish.
    pub async fn shutdown(&self) {
        self.stop.send_replace(true);
        let _idle = self.running.lock().await;
    }

    pub async fn status(&self) -> TaskStatus {
        self.status.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticSinkCatalog;
    use crate::channels::{ExecutorRegistry, LoggerExecutor};
    use crate::domain::{Sink, SolarSystem, SystemId};
    use crate::metering::MeteringProvider;
    use crate::recorder::InMemoryActionStore;
    use anyhow::Result;
    use async_trait::async_trait;

    struct NoMeter;

    #[async_trait]
    impl MeteringProvider for NoMeter {
        async fn fetch_production(&self, _: SystemId, _: &str, _: DateTime<Utc>) -> Result<i64> {
            anyhow::bail!("offline")
        }

        async fn fetch_consumption(&self, _: SystemId, _: &str, _: DateTime<Utc>) -> Result<i64> {
            anyhow::bail!("offline")
        }
    }

    #[tokio::test]
    async fn test_run_once_tracks_status() {
        let system = SolarSystem {
            user_id: "u".into(),
            system_id: 1,
            timezone: "UTC".into(),
            access_token: "t".into(),
        };
        let sink = Sink::new(1, "u", 1, crate::domain::ChannelKind::Logger, None).unwrap();
        let runner = Arc::new(CycleRunner::new(
            Arc::new(StaticSinkCatalog::new(vec![system], vec![sink])),
            Arc::new(NoMeter),
            Arc::new(InMemoryActionStore::new()),
            ExecutorRegistry::new().register(Arc::new(LoggerExecutor)),
        ));
        let scheduler = CycleScheduler::new(runner, Duration::from_secs(900), false);

        scheduler.run_once().await.unwrap();
        scheduler.run_once().await.unwrap();

        let status = scheduler.status().await;
        assert_eq!(status.run_count, 2);
        assert_eq!(status.success_count, 2);
        assert!(status.last_error.is_none());
        assert_eq!(status.last_recorded + status.last_skipped, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let runner = Arc::new(CycleRunner::new(
            Arc::new(StaticSinkCatalog::new(vec![], vec![])),
            Arc::new(NoMeter),
            Arc::new(InMemoryActionStore::new()),
            ExecutorRegistry::new(),
        ));
        let scheduler = Arc::new(CycleScheduler::new(runner, Duration::from_secs(3600), false));
        let handle = scheduler.clone().start();

        scheduler.shutdown().await;
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert_eq!(scheduler.status().await.run_count, 0);
    }
}
