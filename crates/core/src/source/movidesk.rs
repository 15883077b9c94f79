//! Movidesk ticket source.
//!
//! Talks to the public Movidesk REST API (`GET /tickets` with OData query
//! options). Requests go through a sliding-window quota and are retried on
//! transport failures, 429 and 5xx responses.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{header::RETRY_AFTER, Client};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::HelpdeskConfig;
use crate::metrics;
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryPolicy, Retryable};
use crate::ticket::{Interaction, Ticket, Urgency};

use super::{SourceError, TicketQuery, TicketSource};

/// Fields requested for every ticket.
const SELECT_FIELDS: &str = "id,protocol,subject,category,urgency,status,baseStatus,owner,clients,\
createdDate,lastUpdate,actionCount,actions,serviceFull,slaSolutionDate,slaDueDate,dueDate";

const EXPAND: &str = "actions,owner,clients";

/// Retry-After default when a 429 response carries no header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Movidesk API ticket source.
pub struct MovideskSource {
    client: Client,
    base_url: String,
    api_token: String,
    ticket_url_template: Option<String>,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl MovideskSource {
    /// Create a new source from the helpdesk configuration.
    pub fn new(config: &HelpdeskConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            ticket_url_template: config.ticket_url_template.clone(),
            limiter: RateLimiter::new(
                "helpdesk",
                config.requests_per_window,
                Duration::from_secs(config.window_secs),
            ),
            retry: RetryPolicy::from(&config.retry),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Build the `/tickets` URL for a query.
    fn build_url(&self, query: &TicketQuery) -> String {
        format!(
            "{}/tickets?token={}&$select={}&$filter={}&$expand={}&$top={}&$orderby={}",
            self.base_url,
            urlencoding::encode(&self.api_token),
            urlencoding::encode(SELECT_FIELDS),
            urlencoding::encode(&query.filter_expression()),
            urlencoding::encode(EXPAND),
            query.limit,
            urlencoding::encode(query.order_by()),
        )
    }

    /// One rate-limited request.
    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        self.limiter.acquire().await;

        let start = Instant::now();
        let result = self.client.get(url).header("Accept", "application/json").send().await;
        metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&["helpdesk"])
            .observe(start.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["helpdesk", "transport_error"])
                .inc();
            FetchError::Transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["helpdesk", &status.to_string()])
            .inc();

        if response.status().is_success() {
            return response
                .text()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()));
        }

        let retry_after = (status == 429).then(|| {
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER)
        });
        let body = response.text().await.unwrap_or_default();
        Err(FetchError::Status {
            status,
            body: body.chars().take(200).collect(),
            retry_after,
        })
    }

    fn decode(&self, body: &str) -> Result<Vec<Ticket>, SourceError> {
        let payload: TicketsPayload = serde_json::from_str(body)
            .map_err(|e| SourceError::Unavailable(format!("Failed to parse response: {}", e)))?;

        let raw = match payload {
            TicketsPayload::Many(tickets) => tickets,
            TicketsPayload::One(ticket) => vec![*ticket],
        };

        Ok(raw
            .into_iter()
            .filter_map(|t| t.into_ticket(self.ticket_url_template.as_deref()))
            .collect())
    }
}

#[async_trait]
impl TicketSource for MovideskSource {
    fn name(&self) -> &str {
        "movidesk"
    }

    async fn fetch(&self, query: &TicketQuery) -> Result<Vec<Ticket>, SourceError> {
        query.validate()?;

        let url = self.build_url(query);
        debug!(category = %query.category, agent = %query.agent, limit = query.limit, "Fetching tickets");

        let body = self
            .retry
            .run("helpdesk.fetch", |_| self.get_once(&url))
            .await
            .map_err(FetchError::into_source_error)?;

        let tickets: Vec<Ticket> = self
            .decode(&body)?
            .into_iter()
            .filter(|t| query.matches(t))
            .take(query.limit as usize)
            .collect();

        info!(
            category = %query.category,
            agent = %query.agent,
            count = tickets.len(),
            "Fetched tickets"
        );
        Ok(tickets)
    }
}

/// Failure of a single request, classified for retry.
#[derive(Debug, Error)]
enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::Status { retry_after, .. } => *retry_after,
            FetchError::Transport(_) => None,
        }
    }
}

impl FetchError {
    fn into_source_error(self) -> SourceError {
        match self {
            FetchError::Status { status: 400, .. } => SourceError::InvalidQuery(self.to_string()),
            FetchError::Status { status: 401 | 403, .. } => {
                SourceError::Unavailable(format!("credentials rejected ({})", self))
            }
            other => SourceError::Unavailable(other.to_string()),
        }
    }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TicketsPayload {
    Many(Vec<MovideskTicket>),
    One(Box<MovideskTicket>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MovideskTicket {
    id: Option<Value>,
    protocol: Option<Value>,
    subject: Option<String>,
    category: Option<String>,
    urgency: Option<String>,
    status: Option<String>,
    base_status: Option<String>,
    owner: Option<MovideskPerson>,
    clients: Option<Vec<MovideskPerson>>,
    created_date: Option<String>,
    last_update: Option<String>,
    action_count: Option<u32>,
    actions: Option<Vec<MovideskAction>>,
    service_full: Option<Vec<Value>>,
    sla_solution_date: Option<String>,
    sla_due_date: Option<String>,
    due_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MovideskPerson {
    business_name: Option<String>,
    email: Option<String>,
}

impl MovideskPerson {
    fn display_name(&self) -> Option<String> {
        self.business_name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.email.clone().filter(|e| !e.is_empty()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MovideskAction {
    description: Option<String>,
    html_description: Option<String>,
    created_by: Option<MovideskPerson>,
    created_date: Option<String>,
    is_deleted: Option<bool>,
}

impl MovideskTicket {
    /// Effective due date: `slaSolutionDate`, then `serviceFull[0].resolutionDate`,
    /// then `slaDueDate`, then `dueDate`.
    fn effective_due(&self) -> Option<DateTime<Utc>> {
        let resolution_date = self
            .service_full
            .as_ref()
            .and_then(|services| services.first())
            .and_then(|service| service.get("resolutionDate"))
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp);

        self.sla_solution_date
            .as_deref()
            .and_then(parse_timestamp)
            .or(resolution_date)
            .or_else(|| self.sla_due_date.as_deref().and_then(parse_timestamp))
            .or_else(|| self.due_date.as_deref().and_then(parse_timestamp))
    }

    fn into_ticket(self, url_template: Option<&str>) -> Option<Ticket> {
        let Some(id) = self.id.as_ref().and_then(value_to_string) else {
            warn!("Skipping ticket without id");
            return None;
        };
        let Some(created_at) = self.created_date.as_deref().and_then(parse_timestamp) else {
            warn!(ticket_id = %id, "Skipping ticket without a valid creation date");
            return None;
        };

        let sla_due = self.effective_due();
        let number = self
            .protocol
            .as_ref()
            .and_then(value_to_string)
            .unwrap_or_else(|| id.clone());
        let interactions = self
            .actions
            .unwrap_or_default()
            .into_iter()
            .map(|a| Interaction {
                author: a.created_by.as_ref().and_then(MovideskPerson::display_name),
                created_at: a.created_date.as_deref().and_then(parse_timestamp),
                body: a
                    .html_description
                    .filter(|h| !h.trim().is_empty())
                    .or(a.description)
                    .unwrap_or_default(),
                deleted: a.is_deleted.unwrap_or(false),
            })
            .collect();

        Some(Ticket {
            url: url_template.map(|t| t.replace("{id}", &id)),
            number,
            subject: self.subject.unwrap_or_default(),
            client: self
                .clients
                .as_ref()
                .and_then(|c| c.first())
                .and_then(MovideskPerson::display_name),
            owner: self.owner.as_ref().and_then(MovideskPerson::display_name),
            helpdesk_category: self.category,
            status: self.status,
            base_status: self.base_status,
            urgency: self.urgency.as_deref().and_then(Urgency::parse),
            created_at,
            last_update: self.last_update.as_deref().and_then(parse_timestamp),
            sla_due,
            action_count: self.action_count,
            interactions,
            id,
        })
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse an API timestamp. Timestamps without an offset are UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::ticket::TicketCategory;
    use chrono::TimeZone;

    fn config(base_url: &str) -> HelpdeskConfig {
        HelpdeskConfig {
            base_url: base_url.to_string(),
            api_token: "tok en".to_string(),
            ticket_url_template: Some("https://desk.example.com/Ticket/Edit/{id}".to_string()),
            timeout_secs: 5,
            requests_per_window: 10,
            window_secs: 60,
            max_results: 50,
            retry: RetryConfig::default(),
        }
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-01T14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T14:30:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T14:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T11:30:00-03:00"), Some(expected));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_build_url_encodes_parameters() {
        let source = MovideskSource::new(&config("https://api.example.com/public/v1/")).unwrap();
        let query = TicketQuery::new(TicketCategory::New, "agent@example.com", Utc::now())
            .with_limit(25);
        let url = source.build_url(&query);

        assert!(url.starts_with("https://api.example.com/public/v1/tickets?token=tok%20en&"));
        assert!(url.contains("&$top=25&"));
        assert!(url.contains("$orderby=createdDate%20desc"));
        assert!(url.contains("owner%2Femail%20eq%20%27agent%40example.com%27"));
        assert!(url.contains("$expand=actions%2Cowner%2Cclients"));
    }

    #[test]
    fn test_decode_maps_fields() {
        let source = MovideskSource::new(&config("http://localhost")).unwrap();
        let body = r#"[
            {
                "id": 4521,
                "protocol": "2025030001",
                "subject": "VPN down",
                "category": "Network",
                "urgency": "Alta",
                "status": "Em atendimento",
                "baseStatus": "InAttendance",
                "owner": {"businessName": "Ana", "email": "ana@example.com"},
                "clients": [{"businessName": null, "email": "client@example.com"}],
                "createdDate": "2025-03-01T10:00:00",
                "actionCount": 2,
                "actions": [
                    {"description": "plain", "createdDate": "2025-03-01T10:05:00",
                     "createdBy": {"businessName": "Ana"}},
                    {"htmlDescription": "<p>gone</p>", "isDeleted": true}
                ],
                "serviceFull": [{"resolutionDate": "2025-03-02T10:00:00"}],
                "slaDueDate": "2025-03-05T10:00:00"
            }
        ]"#;

        let tickets = source.decode(body).unwrap();
        assert_eq!(tickets.len(), 1);
        let t = &tickets[0];
        assert_eq!(t.id, "4521");
        assert_eq!(t.number, "2025030001");
        assert_eq!(t.urgency, Some(Urgency::High));
        assert_eq!(t.owner.as_deref(), Some("Ana"));
        assert_eq!(t.client.as_deref(), Some("client@example.com"));
        assert_eq!(t.url.as_deref(), Some("https://desk.example.com/Ticket/Edit/4521"));
        // serviceFull resolution date wins over slaDueDate
        assert_eq!(t.sla_due, Some(Utc.with_ymd_and_hms(2025, 3, 2, 10, 0, 0).unwrap()));
        assert_eq!(t.interactions.len(), 2);
        assert_eq!(t.interactions[0].author.as_deref(), Some("Ana"));
        assert!(t.interactions[1].deleted);
    }

    #[test]
    fn test_decode_prefers_sla_solution_date() {
        let source = MovideskSource::new(&config("http://localhost")).unwrap();
        let body = r#"{
            "id": "77",
            "createdDate": "2025-03-01T10:00:00",
            "slaSolutionDate": "2025-03-03T08:00:00Z",
            "serviceFull": [{"resolutionDate": "2025-03-02T10:00:00"}],
            "dueDate": "2025-03-09T10:00:00"
        }"#;
        let tickets = source.decode(body).unwrap();
        assert_eq!(tickets[0].number, "77");
        assert_eq!(
            tickets[0].sla_due,
            Some(Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_decode_skips_incomplete_tickets() {
        let source = MovideskSource::new(&config("http://localhost")).unwrap();
        let body = r#"[
            {"subject": "no id", "createdDate": "2025-03-01T10:00:00"},
            {"id": "1", "subject": "no date"},
            {"id": "2", "subject": "ok", "createdDate": "2025-03-01T10:00:00"}
        ]"#;
        let tickets = source.decode(body).unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].id, "2");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let source = MovideskSource::new(&config("http://localhost")).unwrap();
        assert!(matches!(
            source.decode("<html>maintenance</html>"),
            Err(SourceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_fetch_error_classification() {
        let status = |status| FetchError::Status {
            status,
            body: String::new(),
            retry_after: None,
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(FetchError::Transport("reset".into()).is_retryable());

        assert!(matches!(
            status(400).into_source_error(),
            SourceError::InvalidQuery(_)
        ));
        assert!(matches!(
            status(403).into_source_error(),
            SourceError::Unavailable(_)
        ));
        assert!(matches!(
            status(502).into_source_error(),
            SourceError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_query_without_request() {
        // Port 9 (discard) is never contacted: validation fails first.
        let source = MovideskSource::new(&config("http://127.0.0.1:9")).unwrap();
        let query = TicketQuery::new(TicketCategory::Overdue, "agent@example.com", Utc::now())
            .with_limit(0);
        let err = source.fetch(&query).await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidQuery(_)));
    }
}
