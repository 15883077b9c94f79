use axum::{middleware::from_fn, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, history, middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Run status
        .route("/status", get(handlers::get_status))
        .route("/status/{agent}", get(handlers::get_agent_status))
        // Delivered reports
        .route("/history", get(history::list_reports))
        .route("/history/{agent}/trends", get(history::get_trends))
        // Prometheus scrape
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(from_fn(middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
