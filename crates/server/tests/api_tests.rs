//! API tests against the in-process router.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};

use common::{batch, delivered_outcome, fixtures, report_for, TestFixture};
use digest_core::ticket::{CategorizedTicket, TicketCategory};
use digest_core::{AgentFailure, BatchRunSummary, RunError};

fn overdue(id: &str) -> CategorizedTicket {
    CategorizedTicket::new(fixtures::overdue_ticket(id, 30), TicketCategory::Overdue)
}

fn new(id: &str) -> CategorizedTicket {
    CategorizedTicket::new(fixtures::new_ticket(id, 2), TicketCategory::New)
}

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["helpdesk"]["api_token_configured"], true);
    assert_eq!(response.body["run"]["agents"][0], "alice@example.com");
    assert_eq!(response.body["summarizer"]["enabled"], false);
    assert!(!response.text.contains("secret-token"));
}

#[tokio::test]
async fn test_status_before_any_run() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/status").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["daemon_enabled"], false);
    assert!(response.body["last_batch_at"].is_null());
    assert_eq!(response.body["configured_agents"].as_array().unwrap().len(), 2);
    assert!(response.body["agents"].as_array().unwrap().is_empty());
    // Interval is either the business or the off-hours one.
    let interval = response.body["interval_secs"].as_u64().unwrap();
    assert!(interval == 360 || interval == 120);
}

#[tokio::test]
async fn test_status_after_batch() {
    let fixture = TestFixture::new();
    let report = report_for("alice@example.com", Utc::now(), vec![overdue("1"), new("2")]);
    let report_id = report.id.clone();

    let summary = BatchRunSummary {
        outcomes: vec![delivered_outcome(report)],
        failures: vec![AgentFailure {
            agent: "bob@example.com".to_string(),
            error: RunError::SourceUnavailable("helpdesk returned 503".to_string()),
        }],
    };
    fixture.state.record_batch(&summary).await;

    let response = fixture.get("/api/v1/status").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(!response.body["last_batch_at"].is_null());
    let agents = response.body["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 2);

    let alice = fixture.get("/api/v1/status/alice@example.com").await;
    assert_eq!(alice.status, StatusCode::OK);
    assert_eq!(alice.body["status"], "success");
    assert_eq!(alice.body["report_id"], report_id.as_str());
    assert_eq!(alice.body["tickets"], 2);

    let bob = fixture.get("/api/v1/status/bob@example.com").await;
    assert_eq!(bob.status, StatusCode::OK);
    assert_eq!(bob.body["status"], "failed");
    assert_eq!(bob.body["stage"], "fetch");
    assert!(bob.body["error"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn test_unknown_agent_status_is_not_found() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/status/nobody@example.com").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["error"].as_str().unwrap().contains("nobody@example.com"));
}

#[tokio::test]
async fn test_history_lists_newest_first() {
    let fixture = TestFixture::new();
    let now = Utc::now();
    fixture.record_report(&report_for("alice@example.com", now - Duration::hours(2), vec![overdue("1")]));
    fixture.record_report(&report_for("alice@example.com", now, vec![overdue("1"), overdue("2")]));
    fixture.record_report(&report_for("bob@example.com", now - Duration::hours(1), vec![new("3")]));

    let all = fixture.get("/api/v1/history").await;
    assert_eq!(all.status, StatusCode::OK);
    let records = all.body.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["agent"], "alice@example.com");
    assert_eq!(records[0]["counts"]["overdue"], 2);
    assert_eq!(records[1]["agent"], "bob@example.com");

    let alice = fixture
        .get("/api/v1/history?agent=alice@example.com&limit=1")
        .await;
    let records = alice.body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["delivered_via"], "log");
}

#[tokio::test]
async fn test_trends_group_reports_by_day() {
    let fixture = TestFixture::new();
    let now = Utc::now();
    fixture.record_report(&report_for("alice@example.com", now, vec![overdue("1")]));
    fixture.record_report(&report_for("alice@example.com", now, vec![overdue("1"), new("2")]));

    let response = fixture
        .get("/api/v1/history/alice@example.com/trends?days=3")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let days = response.body.as_array().unwrap();
    let total_reports: u64 = days.iter().map(|d| d["reports"].as_u64().unwrap()).sum();
    assert_eq!(total_reports, 2);
}

#[tokio::test]
async fn test_history_disabled_is_not_found() {
    let fixture = TestFixture::without_history();

    let list = fixture.get("/api/v1/history").await;
    assert_eq!(list.status, StatusCode::NOT_FOUND);

    let trends = fixture.get("/api/v1/history/alice@example.com/trends").await;
    assert_eq!(trends.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    fixture
        .state
        .record_batch(&batch(vec![delivered_outcome(report_for(
            "alice@example.com",
            Utc::now(),
            vec![overdue("1")],
        ))]))
        .await;
    fixture.get("/api/v1/health").await;

    let response = fixture.get("/api/v1/metrics").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text.contains("digest_http_requests_total"));
    assert!(response.text.contains("digest_agent_last_delivery_timestamp_seconds"));
}
