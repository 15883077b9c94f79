use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use digest_core::{PollSchedule, SanitizedConfig};

use crate::metrics::encode_metrics;
use crate::state::{AgentStatus, AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Overall service status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub started_at: DateTime<Utc>,
    pub daemon_enabled: bool,
    /// `None` when the schedule cannot be built from configuration.
    pub business_hours: Option<bool>,
    pub interval_secs: Option<u64>,
    pub last_batch_at: Option<DateTime<Utc>>,
    pub configured_agents: Vec<String>,
    pub agents: Vec<AgentStatus>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let now = Utc::now();
    let schedule = PollSchedule::from_config(state.config());

    Json(StatusResponse {
        started_at: state.started_at(),
        daemon_enabled: state.config().daemon.enabled,
        business_hours: schedule.as_ref().map(|s| s.is_business_hours(now)),
        interval_secs: schedule.as_ref().map(|s| s.interval_at(now).as_secs()),
        last_batch_at: state.last_batch_at().await,
        configured_agents: state.config().run.agents.clone(),
        agents: state.agent_statuses().await,
    })
}

pub async fn get_agent_status(
    State(state): State<Arc<AppState>>,
    Path(agent): Path<String>,
) -> impl IntoResponse {
    match state.agent_status(&agent).await {
        Some(status) => Ok(Json(status)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No run recorded for agent {}", agent),
            }),
        )),
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
