//! HTTP client integration tests.
//!
//! The Movidesk source, the OpenAI-compatible client and the SendGrid notifier
//! are pointed at a local axum stub to check retry, throttling and error
//! classification end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{FixedOffset, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use digest_core::notifier::{SendGridConfig, SendGridNotifier, DEFAULT_SUBJECT_TEMPLATE};
use digest_core::report::assemble;
use digest_core::retry::RetryPolicy;
use digest_core::summarizer::{CompletionRequest, LlmClient, LlmError, OpenAiCompatibleClient};
use digest_core::testing::fixtures;
use digest_core::ticket::{CategorizedTicket, CategoryWindows, TicketCategory};
use digest_core::{
    load_config_from_str, DeliveryError, MovideskSource, Notifier, Report, SourceError,
    SummaryOutcome, TicketQuery, TicketSource,
};

/// Scripted responses, served in order; the last one repeats.
struct Stub {
    script: Vec<(StatusCode, Option<&'static str>, Value)>,
    hits: AtomicUsize,
    last_query: Mutex<HashMap<String, String>>,
    last_body: Mutex<Option<(Option<String>, Value)>>,
}

impl Stub {
    fn new(script: Vec<(StatusCode, Option<&'static str>, Value)>) -> Arc<Self> {
        Arc::new(Self {
            script,
            hits: AtomicUsize::new(0),
            last_query: Mutex::new(HashMap::new()),
            last_body: Mutex::new(None),
        })
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn next(&self) -> Response {
        let index = self.hits.fetch_add(1, Ordering::SeqCst);
        let (status, retry_after, body) = self.script[index.min(self.script.len() - 1)].clone();
        match retry_after {
            Some(secs) => (status, [(header::RETRY_AFTER, secs)], Json(body)).into_response(),
            None => (status, Json(body)).into_response(),
        }
    }
}

async fn tickets_handler(
    State(stub): State<Arc<Stub>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    *stub.last_query.lock().await = params;
    stub.next()
}

async fn chat_handler(State(stub): State<Arc<Stub>>) -> Response {
    stub.next()
}

async fn mail_handler(
    State(stub): State<Arc<Stub>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *stub.last_body.lock().await = Some((auth, body));
    stub.next()
}

async fn spawn(stub: Arc<Stub>) -> String {
    let app = Router::new()
        .route("/tickets", get(tickets_handler))
        .route("/chat/completions", post(chat_handler))
        .route("/v3/mail/send", post(mail_handler))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn source(base_url: &str) -> MovideskSource {
    let mut config = load_config_from_str("[helpdesk]\napi_token = \"secret\"\n")
        .unwrap()
        .helpdesk;
    config.base_url = base_url.to_string();
    config.timeout_secs = 5;
    MovideskSource::new(&config)
        .unwrap()
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10)))
}

fn new_ticket_json(id: u64) -> Value {
    json!({
        "id": id,
        "protocol": id.to_string(),
        "subject": format!("Printer {} offline", id),
        "baseStatus": "New",
        "status": "New",
        "urgency": "High",
        "createdDate": (Utc::now() - chrono::Duration::hours(1)).to_rfc3339(),
        "owner": { "email": "agent@example.com", "businessName": "Agent" },
        "clients": [{ "businessName": "ACME Store 12" }],
        "actions": [{ "description": "Printer does not respond", "createdDate": Utc::now().to_rfc3339() }]
    })
}

fn new_query() -> TicketQuery {
    TicketQuery::new(TicketCategory::New, "agent@example.com", Utc::now())
        .with_limit(10)
        .with_windows(CategoryWindows::default())
}

#[tokio::test]
async fn test_fetch_retries_server_errors() {
    let stub = Stub::new(vec![
        (StatusCode::SERVICE_UNAVAILABLE, None, json!({ "error": "busy" })),
        (StatusCode::OK, None, json!([new_ticket_json(101)])),
    ]);
    let base = spawn(stub.clone()).await;

    let tickets = source(&base).fetch(&new_query()).await.unwrap();

    assert_eq!(stub.hits(), 2);
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].id, "101");
    assert_eq!(tickets[0].client.as_deref(), Some("ACME Store 12"));
}

#[tokio::test]
async fn test_fetch_sends_scoped_query() {
    let stub = Stub::new(vec![(StatusCode::OK, None, json!([]))]);
    let base = spawn(stub.clone()).await;

    source(&base).fetch(&new_query()).await.unwrap();

    let params = stub.last_query.lock().await.clone();
    assert_eq!(params.get("token").map(String::as_str), Some("secret"));
    assert_eq!(params.get("$top").map(String::as_str), Some("10"));
    let filter = params.get("$filter").cloned().unwrap_or_default();
    assert!(filter.contains("owner/email eq 'agent@example.com'"));
    assert!(filter.contains("baseStatus ne 'Closed'"));
    assert!(filter.contains("createdDate ge "));
}

#[tokio::test]
async fn test_fetch_honours_retry_after() {
    let stub = Stub::new(vec![
        (StatusCode::TOO_MANY_REQUESTS, Some("1"), json!({ "error": "slow down" })),
        (StatusCode::OK, None, json!([new_ticket_json(7)])),
    ]);
    let base = spawn(stub.clone()).await;

    let started = Instant::now();
    let tickets = source(&base).fetch(&new_query()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(stub.hits(), 2);
    assert_eq!(tickets.len(), 1);
}

#[tokio::test]
async fn test_bad_request_is_not_retried() {
    let stub = Stub::new(vec![(StatusCode::BAD_REQUEST, None, json!({ "error": "bad filter" }))]);
    let base = spawn(stub.clone()).await;

    let err = source(&base).fetch(&new_query()).await.unwrap_err();

    assert!(matches!(err, SourceError::InvalidQuery(_)));
    assert_eq!(stub.hits(), 1);
}

#[tokio::test]
async fn test_persistent_outage_exhausts_attempts() {
    let stub = Stub::new(vec![(StatusCode::BAD_GATEWAY, None, json!({}))]);
    let base = spawn(stub.clone()).await;

    let err = source(&base).fetch(&new_query()).await.unwrap_err();

    assert!(matches!(err, SourceError::Unavailable(_)));
    assert_eq!(stub.hits(), 3);
}

#[tokio::test]
async fn test_chat_completion_success() {
    let stub = Stub::new(vec![(
        StatusCode::OK,
        None,
        json!({
            "model": "llama-3.1-8b-instant",
            "choices": [{ "message": { "role": "assistant", "content": "Printer offline at store 12." } }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 9 }
        }),
    )]);
    let base = spawn(stub.clone()).await;
    let client =
        OpenAiCompatibleClient::new("groq", "gsk_test", "llama-3.1-8b-instant", Duration::from_secs(5))
            .unwrap()
            .with_api_base(base);

    let response = client.complete(CompletionRequest::new("Summarize")).await.unwrap();

    assert_eq!(response.text, "Printer offline at store 12.");
    assert_eq!(response.usage.input_tokens, 120);
    assert_eq!(response.usage.output_tokens, 9);
    assert_eq!(response.model, "llama-3.1-8b-instant");
}

#[tokio::test]
async fn test_decommissioned_model_is_a_config_error() {
    let stub = Stub::new(vec![(
        StatusCode::BAD_REQUEST,
        None,
        json!({
            "error": {
                "message": "The model `llama3-8b-8192` has been decommissioned",
                "type": "invalid_request_error",
                "code": "model_decommissioned"
            }
        }),
    )]);
    let base = spawn(stub.clone()).await;
    let client = OpenAiCompatibleClient::new("groq", "gsk_test", "llama3-8b-8192", Duration::from_secs(5))
        .unwrap()
        .with_api_base(base);

    let err = client.complete(CompletionRequest::new("Summarize")).await.unwrap_err();

    assert!(matches!(err, LlmError::Api { status: 400, .. }));
    assert!(err.is_config_error());
}

fn sendgrid(base_url: &str) -> SendGridNotifier {
    let config = SendGridConfig {
        api_key: "SG.key".to_string(),
        from_email: "digest@example.com".to_string(),
        from_name: None,
        to: Vec::new(),
        api_base: base_url.to_string(),
        timeout_secs: 5,
    };
    SendGridNotifier::new(
        &config,
        DEFAULT_SUBJECT_TEMPLATE,
        FixedOffset::west_opt(3 * 3600).unwrap(),
    )
    .unwrap()
    .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10)))
}

fn one_ticket_report() -> Report {
    let tickets = vec![CategorizedTicket::new(
        fixtures::overdue_ticket("42", 30),
        TicketCategory::Overdue,
    )];
    let outcomes: HashMap<String, SummaryOutcome> =
        HashMap::from([("42".to_string(), SummaryOutcome::generated("Printer jammed"))]);
    assemble("agent@example.com", fixtures::now(), &tickets, &outcomes, fixtures::now())
}

#[tokio::test]
async fn test_sendgrid_retries_then_accepts() {
    let stub = Stub::new(vec![
        (StatusCode::SERVICE_UNAVAILABLE, None, json!({ "errors": [] })),
        (StatusCode::ACCEPTED, None, Value::Null),
    ]);
    let base = spawn(stub.clone()).await;

    sendgrid(&base).deliver(&one_ticket_report()).await.unwrap();

    assert_eq!(stub.hits(), 2);
    let (auth, body) = stub.last_body.lock().await.clone().unwrap();
    assert_eq!(auth.as_deref(), Some("Bearer SG.key"));
    assert_eq!(body["from"]["email"], "digest@example.com");
    // No recipients configured: the report goes to its agent.
    assert_eq!(body["personalizations"][0]["to"][0]["email"], "agent@example.com");
    assert_eq!(body["content"][0]["type"], "text/plain");
    assert!(body["content"][0]["value"].as_str().unwrap().contains("Printer jammed"));
}

#[tokio::test]
async fn test_sendgrid_client_error_is_rejected_without_retry() {
    let stub = Stub::new(vec![(
        StatusCode::UNAUTHORIZED,
        None,
        json!({ "errors": [{ "message": "invalid api key" }] }),
    )]);
    let base = spawn(stub.clone()).await;

    let err = sendgrid(&base).deliver(&one_ticket_report()).await.unwrap_err();

    assert!(matches!(err, DeliveryError::Rejected { status: 401, .. }));
    assert!(err.to_string().contains("invalid api key"));
    assert_eq!(stub.hits(), 1);
}
