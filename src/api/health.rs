use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::controller::{AppState, TaskStatus};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    version: &'static str,
    cycles: TaskStatus,
}

/// GET /health
///
/// Liveness plus the bookkeeping of the last evaluation cycle. A failing
/// cycle does not make the service unhealthy; it is reported in `cycles`.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        cycles: state.scheduler.status().await,
    })
}
