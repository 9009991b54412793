use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::{
    auth::{require_bearer, BearerToken},
    catalog::NewSink,
    controller::{AppState, CycleReport},
    domain::{ActionRecord, ChannelKind, Sink, SinkId, SystemId},
};

const MAX_HISTORY_LIMIT: usize = 500;

pub fn router(state: AppState) -> Router {
    let token = BearerToken::new(state.cfg.auth.token.as_str());
    Router::new()
        .route("/cycles", post(trigger_cycle))
        .route("/sinks", post(create_sink))
        .route("/sinks/:id", delete(delete_sink))
        .route("/sinks/:id/actions", get(list_actions))
        .route_layer(middleware::from_fn_with_state(token, require_bearer))
        .with_state(state)
}

/// POST /api/v1/cycles - run one evaluation cycle now.
pub async fn trigger_cycle(State(st): State<AppState>) -> Result<Json<CycleReport>, ApiError> {
    Ok(Json(st.scheduler.run_once().await?))
}

/// A sink as shown to API clients; thermostat credentials stay server side.
#[derive(Debug, Serialize)]
pub struct SinkView {
    pub id: SinkId,
    pub user_id: String,
    pub system_id: SystemId,
    pub channel: ChannelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub connected: bool,
    pub created: DateTime<Utc>,
}

impl From<Sink> for SinkView {
    fn from(sink: Sink) -> Self {
        // Logger sinks have nowhere to deliver to; everything else needs a recipient.
        let connected = sink.channel == ChannelKind::Logger || sink.recipient.is_some();
        let recipient = match sink.channel {
            ChannelKind::Ecobee => None,
            _ => sink.recipient,
        };
        Self {
            id: sink.id,
            user_id: sink.user_id,
            system_id: sink.system_id,
            channel: sink.channel,
            recipient,
            connected,
            created: sink.created,
        }
    }
}

pub async fn create_sink(
    State(st): State<AppState>,
    Json(req): Json<NewSink>,
) -> Result<impl IntoResponse, ApiError> {
    let sink = st.catalog.add_sink(req).await?;
    tracing::info!(sink_id = sink.id, system_id = sink.system_id, channel = %sink.channel, "sink created");
    Ok((StatusCode::CREATED, Json(SinkView::from(sink))))
}

pub async fn delete_sink(
    State(st): State<AppState>,
    Path(id): Path<SinkId>,
) -> Result<StatusCode, ApiError> {
    if st.catalog.remove_sink(id).await? {
        tracing::info!(sink_id = id, "sink removed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("sink {id}")))
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/sinks/:id/actions - newest first.
pub async fn list_actions(
    State(st): State<AppState>,
    Path(id): Path<SinkId>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<ActionRecord>>, ApiError> {
    if st.catalog.find_sink(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("sink {id}")));
    }
    let limit = q
        .limit
        .unwrap_or(st.cfg.cycle.history_depth)
        .clamp(1, MAX_HISTORY_LIMIT);
    Ok(Json(st.store.recent_actions(id, limit).await?))
}
