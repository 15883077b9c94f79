//! Core ticket data types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Urgency
// ============================================================================

/// Ordered severity classification attached to a ticket.
///
/// Ordering is meaningful: `Low < Medium < High < Urgent < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

impl Urgency {
    /// Parse a helpdesk urgency label.
    ///
    /// Accepts the English names plus the Portuguese labels the helpdesk uses
    /// for Brazilian accounts. "Normal" maps to `Medium`. Unknown labels yield `None`.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" | "baixa" | "baixo" => Some(Urgency::Low),
            "medium" | "normal" | "média" | "media" | "médio" | "medio" => Some(Urgency::Medium),
            "high" | "alta" | "alto" => Some(Urgency::High),
            "urgent" | "urgente" => Some(Urgency::Urgent),
            "critical" | "crítica" | "critica" | "crítico" | "critico" => Some(Urgency::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "Low",
            Urgency::Medium => "Medium",
            Urgency::High => "High",
            Urgency::Urgent => "Urgent",
            Urgency::Critical => "Critical",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Categories
// ============================================================================

/// Report category. Declaration order is the report section order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    /// Created recently.
    New,
    /// Open and past its SLA due date.
    Overdue,
    /// Open and due within the expiring horizon.
    Expiring,
}

impl TicketCategory {
    pub const ALL: [TicketCategory; 3] = [
        TicketCategory::New,
        TicketCategory::Overdue,
        TicketCategory::Expiring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketCategory::New => "new",
            TicketCategory::Overdue => "overdue",
            TicketCategory::Expiring => "expiring",
        }
    }
}

impl fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time horizons that decide category membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryWindows {
    /// Tickets created within this window are new.
    pub new_within: Duration,
    /// Open tickets due within this window are expiring.
    pub expiring_within: Duration,
}

impl CategoryWindows {
    pub fn from_hours(new_within_hours: i64, expiring_within_hours: i64) -> Self {
        Self {
            new_within: Duration::hours(new_within_hours),
            expiring_within: Duration::hours(expiring_within_hours),
        }
    }
}

impl Default for CategoryWindows {
    fn default() -> Self {
        Self::from_hours(24, 48)
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// One entry of a ticket's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Body text; may contain HTML markup.
    pub body: String,
    #[serde(default)]
    pub deleted: bool,
}

/// A support ticket as fetched from the helpdesk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Stable unique identifier.
    pub id: String,
    /// Display number (helpdesk protocol); falls back to the id.
    pub number: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Helpdesk-side category label (not the report category).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helpdesk_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Normalized status: "New", "InAttendance", "Stopped", "Resolved", "Closed", ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_due: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_count: Option<u32>,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Ticket {
    /// Resolved and closed tickets are never overdue or expiring.
    pub fn is_open(&self) -> bool {
        !matches!(self.base_status.as_deref(), Some("Closed") | Some("Resolved"))
    }

    pub fn is_new(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.created_at >= now - window
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.sla_due.is_some_and(|due| now > due)
    }

    /// Due strictly after `now` and no later than `now + horizon`.
    pub fn is_expiring(&self, now: DateTime<Utc>, horizon: Duration) -> bool {
        self.is_open()
            && self
                .sla_due
                .is_some_and(|due| now < due && due <= now + horizon)
    }

    /// Whole days past the SLA due date; 0 when not overdue.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        match self.sla_due {
            Some(due) if self.is_overdue(now) => (now - due).num_days().max(0),
            _ => 0,
        }
    }

    /// Time left until the SLA due date, if it is in the future.
    pub fn time_until_due(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.sla_due.filter(|due| *due > now).map(|due| due - now)
    }

    pub fn matches(&self, category: TicketCategory, now: DateTime<Utc>, windows: &CategoryWindows) -> bool {
        match category {
            TicketCategory::New => self.is_new(now, windows.new_within),
            TicketCategory::Overdue => self.is_overdue(now),
            TicketCategory::Expiring => self.is_expiring(now, windows.expiring_within),
        }
    }

    /// Most recent non-deleted interactions, newest first.
    pub fn latest_interactions(&self, limit: usize) -> Vec<&Interaction> {
        let mut live: Vec<&Interaction> = self.interactions.iter().filter(|i| !i.deleted).collect();
        // Undated entries sort last.
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        live.truncate(limit);
        live
    }
}

/// A deduplicated ticket with every category whose query returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedTicket {
    pub ticket: Ticket,
    pub categories: BTreeSet<TicketCategory>,
}

impl CategorizedTicket {
    pub fn new(ticket: Ticket, category: TicketCategory) -> Self {
        Self {
            ticket,
            categories: BTreeSet::from([category]),
        }
    }

    pub fn id(&self) -> &str {
        &self.ticket.id
    }

    pub fn has(&self, category: TicketCategory) -> bool {
        self.categories.contains(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn ticket(due: Option<DateTime<Utc>>, base_status: &str) -> Ticket {
        Ticket {
            id: "1".to_string(),
            number: "1".to_string(),
            subject: "Printer offline".to_string(),
            client: None,
            owner: None,
            helpdesk_category: None,
            status: None,
            base_status: Some(base_status.to_string()),
            urgency: None,
            created_at: now() - Duration::days(3),
            last_update: None,
            sla_due: due,
            action_count: None,
            interactions: Vec::new(),
            url: None,
        }
    }

    #[test]
    fn test_urgency_ordering() {
        assert!(Urgency::Low < Urgency::Medium);
        assert!(Urgency::Medium < Urgency::High);
        assert!(Urgency::High < Urgency::Urgent);
        assert!(Urgency::Urgent < Urgency::Critical);
    }

    #[test]
    fn test_urgency_parse_labels() {
        assert_eq!(Urgency::parse("High"), Some(Urgency::High));
        assert_eq!(Urgency::parse(" normal "), Some(Urgency::Medium));
        assert_eq!(Urgency::parse("Urgente"), Some(Urgency::Urgent));
        assert_eq!(Urgency::parse("Crítica"), Some(Urgency::Critical));
        assert_eq!(Urgency::parse("Baixa"), Some(Urgency::Low));
        assert_eq!(Urgency::parse("whenever"), None);
    }

    #[test]
    fn test_category_order_matches_sections() {
        let mut cats = vec![
            TicketCategory::Expiring,
            TicketCategory::New,
            TicketCategory::Overdue,
        ];
        cats.sort();
        assert_eq!(cats, TicketCategory::ALL.to_vec());
    }

    #[test]
    fn test_overdue_requires_open_and_past_due() {
        let past = Some(now() - Duration::hours(50));
        assert!(ticket(past, "InAttendance").is_overdue(now()));
        assert!(!ticket(past, "Resolved").is_overdue(now()));
        assert!(!ticket(past, "Closed").is_overdue(now()));
        assert!(!ticket(None, "New").is_overdue(now()));
        assert!(!ticket(Some(now()), "New").is_overdue(now()));
    }

    #[test]
    fn test_days_overdue_counts_whole_days() {
        let t = ticket(Some(now() - Duration::hours(50)), "New");
        assert_eq!(t.days_overdue(now()), 2);

        let t = ticket(Some(now() - Duration::hours(3)), "New");
        assert_eq!(t.days_overdue(now()), 0);

        let t = ticket(Some(now() + Duration::hours(3)), "New");
        assert_eq!(t.days_overdue(now()), 0);
    }

    #[test]
    fn test_expiring_window_bounds() {
        let horizon = Duration::hours(48);
        assert!(ticket(Some(now() + Duration::hours(1)), "New").is_expiring(now(), horizon));
        assert!(ticket(Some(now() + horizon), "New").is_expiring(now(), horizon));
        assert!(!ticket(Some(now() + horizon + Duration::seconds(1)), "New")
            .is_expiring(now(), horizon));
        assert!(!ticket(Some(now()), "New").is_expiring(now(), horizon));
        assert!(!ticket(Some(now() + Duration::hours(1)), "Resolved").is_expiring(now(), horizon));
    }

    #[test]
    fn test_is_new_window() {
        let mut t = ticket(None, "New");
        t.created_at = now() - Duration::hours(23);
        assert!(t.is_new(now(), Duration::hours(24)));
        t.created_at = now() - Duration::hours(25);
        assert!(!t.is_new(now(), Duration::hours(24)));
    }

    #[test]
    fn test_latest_interactions_skips_deleted_and_orders_newest_first() {
        let mut t = ticket(None, "New");
        let at = |h: i64| Some(now() - Duration::hours(h));
        t.interactions = vec![
            Interaction { author: None, created_at: at(5), body: "oldest".into(), deleted: false },
            Interaction { author: None, created_at: at(1), body: "newest".into(), deleted: false },
            Interaction { author: None, created_at: at(2), body: "removed".into(), deleted: true },
            Interaction { author: None, created_at: None, body: "undated".into(), deleted: false },
            Interaction { author: None, created_at: at(3), body: "middle".into(), deleted: false },
        ];

        let bodies: Vec<&str> = t
            .latest_interactions(3)
            .iter()
            .map(|i| i.body.as_str())
            .collect();
        assert_eq!(bodies, vec!["newest", "middle", "oldest"]);
    }
}
