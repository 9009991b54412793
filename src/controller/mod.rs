pub mod runner;
pub mod scheduler;

pub use runner::{CycleReport, CycleRunner, CycleSettings, SinkOutcome, SinkReport};
pub use scheduler::{CycleScheduler, TaskStatus};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::catalog::{SinkCatalog, StaticSinkCatalog};
use crate::channels::{
    EcobeeClient, EcobeeExecutor, EmailExecutor, ExecutorRegistry, LoggerExecutor, MessageSender,
    SendGridSender, SmsExecutor, UnconfiguredSender,
};
use crate::config::Config;
use crate::metering::{EnphaseMeteringProvider, MeteringProvider};
use crate::recorder::ActionStore;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub catalog: Arc<dyn SinkCatalog>,
    pub store: Arc<dyn ActionStore>,
    pub scheduler: Arc<CycleScheduler>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let (systems, sinks) = cfg.seed()?;
        info!(systems = systems.len(), sinks = sinks.len(), "catalog seeded");
        let catalog: Arc<dyn SinkCatalog> = Arc::new(StaticSinkCatalog::new(systems, sinks));

        let metering: Arc<dyn MeteringProvider> = Arc::new(EnphaseMeteringProvider::new(
            cfg.enphase.base_url.clone(),
            cfg.enphase.api_key.clone(),
            Duration::from_secs(cfg.enphase.http_timeout_seconds),
        )?);

        let store = action_store(&cfg).await?;
        let executors = executors(&cfg)?;
        info!(channels = ?executors.kinds().collect::<Vec<_>>(), "channel executors registered");

        Ok(Self::from_parts(cfg, catalog, metering, store, executors))
    }

    /// Wires already-built collaborators; used by tests and alternative frontends.
    pub fn from_parts(
        cfg: Config,
        catalog: Arc<dyn SinkCatalog>,
        metering: Arc<dyn MeteringProvider>,
        store: Arc<dyn ActionStore>,
        executors: ExecutorRegistry,
    ) -> Self {
        let settings = CycleSettings {
            send_timeout: cfg.cycle.send_timeout(),
            history_depth: cfg.cycle.history_depth,
            daylight: cfg.daylight,
            cooldowns: cfg.cooldowns.to_cooldowns(),
        };
        let runner = Arc::new(CycleRunner::with_settings(
            catalog.clone(),
            metering,
            store.clone(),
            executors,
            settings,
        ));
        let scheduler = Arc::new(CycleScheduler::new(
            runner,
            cfg.cycle.interval(),
            cfg.cycle.run_on_startup,
        ));

        Self {
            cfg: Arc::new(cfg),
            catalog,
            store,
            scheduler,
        }
    }
}

#[cfg(feature = "db")]
async fn action_store(cfg: &Config) -> Result<Arc<dyn ActionStore>> {
    let store = crate::recorder::PgActionStore::connect(&cfg.db.url, cfg.db.max_connections).await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "db"))]
async fn action_store(_cfg: &Config) -> Result<Arc<dyn ActionStore>> {
    warn!("built without the db feature: action history is kept in memory only");
    Ok(Arc::new(crate::recorder::InMemoryActionStore::new()))
}

fn executors(cfg: &Config) -> Result<ExecutorRegistry> {
    let email_sender: Arc<dyn MessageSender> = match &cfg.sendgrid.api_key {
        Some(key) if !key.is_empty() => Arc::new(SendGridSender::new(
            cfg.sendgrid.base_url.clone(),
            key.clone(),
            cfg.sendgrid.from_address.clone(),
            cfg.sendgrid.from_name.clone(),
            Duration::from_secs(cfg.sendgrid.http_timeout_seconds),
        )?),
        _ => {
            warn!("sendgrid api key not set: email deliveries will fail");
            Arc::new(UnconfiguredSender::new("email"))
        }
    };
    // TODO: wire an SMS gateway; sms sinks record failed deliveries until then.
    let sms_sender: Arc<dyn MessageSender> = Arc::new(UnconfiguredSender::new("sms"));

    let thermostat = Arc::new(EcobeeClient::new(
        cfg.ecobee.base_url.clone(),
        Duration::from_secs(cfg.ecobee.http_timeout_seconds),
    )?);

    Ok(ExecutorRegistry::new()
        .register(Arc::new(LoggerExecutor))
        .register(Arc::new(EmailExecutor::new(
            email_sender,
            cfg.server.public_hostname.clone(),
        )))
        .register(Arc::new(SmsExecutor::new(sms_sender)))
        .register(Arc::new(EcobeeExecutor::new(
            thermostat,
            cfg.ecobee.consume_hold,
            cfg.ecobee.produce_hold,
        ))))
}

pub fn spawn_cycle_loop(state: &AppState) -> JoinHandle<()> {
    state.scheduler.clone().start()
}
