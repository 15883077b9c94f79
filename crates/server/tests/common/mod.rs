//! Common test utilities for API testing.
//!
//! This module provides a test fixture that builds the router in-process
//! over an in-memory report history, so handlers can be exercised without
//! binding a port or reaching the helpdesk.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use digest_core::report::assemble;
use digest_core::ticket::CategorizedTicket;
use digest_core::{
    load_config_from_str, BatchRunSummary, Config, Report, ReportHistory, RunOutcome, RunStatus,
    SqliteReportHistory, SummaryOutcome,
};
use digest_server::state::AppState;

/// Re-export fixtures for test convenience
pub use digest_core::testing::fixtures;

pub const TEST_CONFIG: &str = r#"
[helpdesk]
api_token = "secret-token"

[run]
agents = ["alice@example.com", "bob@example.com"]

[summarizer]
enabled = false
"#;

/// Test fixture wrapping the API router.
pub struct TestFixture {
    pub router: Router,
    pub state: Arc<AppState>,
    pub history: Option<Arc<SqliteReportHistory>>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Fixture with report history enabled.
    pub fn new() -> Self {
        let history = Arc::new(SqliteReportHistory::in_memory().unwrap());
        let state = AppState::new(test_config())
            .with_history(Arc::clone(&history) as Arc<dyn ReportHistory>);
        Self::from_state(state, Some(history))
    }

    /// Fixture with report history disabled.
    pub fn without_history() -> Self {
        Self::from_state(AppState::new(test_config()), None)
    }

    fn from_state(state: AppState, history: Option<Arc<SqliteReportHistory>>) -> Self {
        let state = Arc::new(state);
        let router = digest_server::api::create_router(Arc::clone(&state));
        Self {
            router,
            state,
            history,
        }
    }

    /// Store a delivered report in the history.
    pub fn record_report(&self, report: &Report) {
        self.history
            .as_ref()
            .expect("fixture has no history")
            .record(report, "log")
            .unwrap();
    }

    /// Send a GET request to the router.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse { status, body, text }
    }
}

pub fn test_config() -> Config {
    load_config_from_str(TEST_CONFIG).unwrap()
}

/// Report for `agent` listing the given tickets with generated summaries.
pub fn report_for(agent: &str, at: DateTime<Utc>, tickets: Vec<CategorizedTicket>) -> Report {
    let outcomes: HashMap<String, SummaryOutcome> = tickets
        .iter()
        .map(|t| (t.id().to_string(), SummaryOutcome::generated("summary")))
        .collect();
    assemble(agent, at, &tickets, &outcomes, at)
}

/// Successful outcome delivered through the log notifier.
pub fn delivered_outcome(report: Report) -> RunOutcome {
    RunOutcome {
        agent: report.agent.clone(),
        status: RunStatus::Success,
        summary_stats: Default::default(),
        delivered_via: Some("log".to_string()),
        comparison: None,
        started_at: report.generated_at,
        finished_at: report.generated_at,
        report,
    }
}

pub fn batch(outcomes: Vec<RunOutcome>) -> BatchRunSummary {
    BatchRunSummary {
        outcomes,
        failures: Vec::new(),
    }
}
