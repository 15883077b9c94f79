//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the external service traits
//! (helpdesk, LLM, notifier), allowing the full digest pipeline to be tested
//! without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use digest_core::testing::{fixtures, MockLlmClient, MockNotifier, MockTicketSource};
//!
//! let source = Arc::new(MockTicketSource::new());
//! let llm = Arc::new(MockLlmClient::new());
//! let notifier = Arc::new(MockNotifier::new());
//!
//! source
//!     .set_results(TicketCategory::Overdue, vec![fixtures::overdue_ticket("7", 50)])
//!     .await;
//!
//! // Build a DigestRunner around them...
//! ```

mod mock_llm;
mod mock_notifier;
mod mock_source;

pub use mock_llm::MockLlmClient;
pub use mock_notifier::MockNotifier;
pub use mock_source::MockTicketSource;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::ticket::{Interaction, Ticket, Urgency};

    /// Fixed reference time used by fixtures: 2025-03-10 12:00 UTC (a Monday).
    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    /// Open ticket created three days before [`now`], without due date.
    pub fn ticket(id: &str, subject: &str) -> Ticket {
        Ticket {
            id: id.to_string(),
            number: id.to_string(),
            subject: subject.to_string(),
            client: Some("ACME Store 12".to_string()),
            owner: Some("Agent Smith".to_string()),
            helpdesk_category: Some("Infrastructure".to_string()),
            status: Some("In attendance".to_string()),
            base_status: Some("InAttendance".to_string()),
            urgency: Some(Urgency::Medium),
            created_at: now() - Duration::days(3),
            last_update: Some(now() - Duration::hours(2)),
            sla_due: None,
            action_count: Some(1),
            interactions: vec![Interaction {
                author: Some("Customer".to_string()),
                created_at: Some(now() - Duration::days(3)),
                body: format!("<p>Reported issue: {}</p>", subject),
                deleted: false,
            }],
            url: Some(format!("https://helpdesk.example.com/Ticket/Edit/{}", id)),
        }
    }

    /// Ticket created `hours_ago` hours before [`now`].
    pub fn new_ticket(id: &str, hours_ago: i64) -> Ticket {
        let mut t = ticket(id, &format!("New request {}", id));
        t.created_at = now() - Duration::hours(hours_ago);
        t.base_status = Some("New".to_string());
        t
    }

    /// Ticket whose SLA expired `hours_late` hours before [`now`].
    pub fn overdue_ticket(id: &str, hours_late: i64) -> Ticket {
        let mut t = ticket(id, &format!("Late request {}", id));
        t.created_at = now() - Duration::days(10);
        t.sla_due = Some(now() - Duration::hours(hours_late));
        t
    }

    /// Ticket due `hours_left` hours after [`now`].
    pub fn expiring_ticket(id: &str, hours_left: i64) -> Ticket {
        let mut t = ticket(id, &format!("Due soon {}", id));
        t.sla_due = Some(now() + Duration::hours(hours_left));
        t
    }
}
