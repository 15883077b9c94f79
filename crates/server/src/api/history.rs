//! Report history API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

use digest_core::history::{DailyTotals, ReportHistory};
use digest_core::ReportRecord;

use super::handlers::ErrorResponse;
use crate::state::AppState;

/// Maximum allowed limit for history queries
const MAX_LIMIT: usize = 500;

/// Default limit for history queries
const DEFAULT_LIMIT: usize = 50;

/// Default trend window in days
const DEFAULT_DAYS: i64 = 7;

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Deserialize)]
pub struct ListReportsParams {
    pub agent: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TrendsParams {
    pub days: Option<i64>,
}

fn history(state: &AppState) -> Result<&Arc<dyn ReportHistory>, ApiError> {
    state.history().ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Report history is disabled".to_string(),
            }),
        )
    })
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// List delivered reports, newest first.
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListReportsParams>,
) -> Result<Json<Vec<ReportRecord>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let records = history(&state)?
        .list(params.agent.as_deref(), limit)
        .map_err(internal)?;
    Ok(Json(records))
}

/// Daily totals for one agent.
pub async fn get_trends(
    State(state): State<Arc<AppState>>,
    Path(agent): Path<String>,
    Query(params): Query<TrendsParams>,
) -> Result<Json<Vec<DailyTotals>>, ApiError> {
    let days = params.days.unwrap_or(DEFAULT_DAYS).clamp(1, 365);
    let since = Utc::now() - Duration::days(days);
    let totals = history(&state)?.trends(&agent, since).map_err(internal)?;
    Ok(Json(totals))
}
