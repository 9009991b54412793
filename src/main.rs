use anyhow::Result;
use solar_nudge::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

const MIN_TOKEN_LEN: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::load()?;

    if cfg.auth.token.len() < MIN_TOKEN_LEN || cfg.auth.token == "change-me" {
        anyhow::bail!(
            "SOLAR_NUDGE__AUTH__TOKEN must be set to a random token of at least {MIN_TOKEN_LEN} characters. \
            Generate one with: openssl rand -base64 32"
        );
    }
    if cfg.enphase.api_key.is_empty() {
        warn!("enphase api key not set: every metering call will fail");
    }

    let app_state = controller::AppState::new(cfg.clone()).await?;
    let app = api::router(app_state.clone());

    let addr = cfg.server.socket_addr()?;
    info!(%addr, "starting solar-nudge");

    let cycle_loop = controller::spawn_cycle_loop(&app_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    app_state.scheduler.shutdown().await;
    if let Err(e) = cycle_loop.await {
        warn!(error = %e, "cycle loop ended abnormally");
    }
    info!("shutdown complete");
    Ok(())
}
