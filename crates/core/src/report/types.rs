//! Report data types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::summarizer::SummaryOutcome;
use crate::ticket::{Ticket, TicketCategory};

/// One ticket line in a report section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub ticket: Ticket,
    /// Every category the ticket was returned under.
    pub categories: BTreeSet<TicketCategory>,
    pub summary: SummaryOutcome,
    /// Whole days past due at generation time (0 when not overdue).
    pub days_overdue: i64,
}

impl ReportEntry {
    pub fn id(&self) -> &str {
        &self.ticket.id
    }
}

/// Ordered entries for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub category: TicketCategory,
    pub entries: Vec<ReportEntry>,
}

impl ReportSection {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Aggregate numbers shown in the report header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub new: usize,
    pub overdue: usize,
    pub expiring: usize,
    pub unique_tickets: usize,
    pub summaries_generated: usize,
    pub summaries_failed: usize,
    pub summaries_skipped: usize,
}

/// The digest delivered to one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: String,
    pub agent: String,
    pub generated_at: DateTime<Utc>,
    /// Always new, overdue, expiring, in that order.
    pub sections: Vec<ReportSection>,
    pub counts: ReportCounts,
}

impl Report {
    pub fn section(&self, category: TicketCategory) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.category == category)
    }

    /// True when no section has entries.
    pub fn is_empty(&self) -> bool {
        self.counts.unique_tickets == 0
    }

    /// Unique ticket ids in the report, in first-listed order.
    pub fn ticket_ids(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter())
            .filter(|e| seen.insert(e.id().to_string()))
            .map(|e| e.id().to_string())
            .collect()
    }

    /// Tickets that ended up with a placeholder instead of a summary.
    pub fn has_placeholders(&self) -> bool {
        self.counts.summaries_failed > 0
    }
}
