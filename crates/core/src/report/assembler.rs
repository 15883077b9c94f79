//! Report assembly from deduplicated tickets and their summaries.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::types::{Report, ReportCounts, ReportEntry, ReportSection};
use crate::summarizer::SummaryOutcome;
use crate::ticket::{CategorizedTicket, TicketCategory};

/// Reason attached to tickets that reached assembly without an outcome.
const MISSING_OUTCOME: &str = "summary not produced";

/// Build the report for one agent.
///
/// Each ticket is listed under every category it carries. A ticket missing
/// from `outcomes` gets a placeholder rather than being dropped.
pub fn assemble(
    agent: &str,
    generated_at: DateTime<Utc>,
    tickets: &[CategorizedTicket],
    outcomes: &HashMap<String, SummaryOutcome>,
    now: DateTime<Utc>,
) -> Report {
    let mut counts = ReportCounts::default();
    let mut sections: Vec<ReportSection> = TicketCategory::ALL
        .iter()
        .map(|category| ReportSection {
            category: *category,
            entries: Vec::new(),
        })
        .collect();

    let mut seen = std::collections::HashSet::new();
    for ticket in tickets {
        if !seen.insert(ticket.id()) {
            continue;
        }
        let summary = outcomes
            .get(ticket.id())
            .cloned()
            .unwrap_or_else(|| SummaryOutcome::unavailable(MISSING_OUTCOME));

        counts.unique_tickets += 1;
        match &summary {
            SummaryOutcome::Generated { .. } => counts.summaries_generated += 1,
            SummaryOutcome::Unavailable { .. } => counts.summaries_failed += 1,
            SummaryOutcome::Skipped => counts.summaries_skipped += 1,
        }

        for category in &ticket.categories {
            let entry = ReportEntry {
                ticket: ticket.ticket.clone(),
                categories: ticket.categories.clone(),
                summary: summary.clone(),
                days_overdue: ticket.ticket.days_overdue(now),
            };
            if let Some(section) = sections.iter_mut().find(|s| s.category == *category) {
                section.entries.push(entry);
            }
        }
    }

    for section in &mut sections {
        section
            .entries
            .sort_by(|a, b| compare_entries(section.category, a, b));
        match section.category {
            TicketCategory::New => counts.new = section.len(),
            TicketCategory::Overdue => counts.overdue = section.len(),
            TicketCategory::Expiring => counts.expiring = section.len(),
        }
    }

    Report {
        id: uuid::Uuid::new_v4().to_string(),
        agent: agent.to_string(),
        generated_at,
        sections,
        counts,
    }
}

/// Section ordering; ties always break by ticket id ascending.
fn compare_entries(category: TicketCategory, a: &ReportEntry, b: &ReportEntry) -> Ordering {
    let primary = match category {
        TicketCategory::New => b.ticket.created_at.cmp(&a.ticket.created_at),
        TicketCategory::Overdue => b.days_overdue.cmp(&a.days_overdue),
        // Tickets without a due date sort last.
        TicketCategory::Expiring => match (a.ticket.sla_due, b.ticket.sla_due) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    primary.then_with(|| compare_ids(a.id(), b.id()))
}

/// Numeric ids compare numerically, anything else lexically.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}
