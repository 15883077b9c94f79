//! Plain-text rendering of reports.

use chrono::{DateTime, FixedOffset, Utc};
use std::fmt::Write;

use super::types::{Report, ReportEntry, ReportSection};
use crate::summarizer::SummaryOutcome;
use crate::ticket::TicketCategory;

/// Fill a subject template. Supports `{count}`, `{new}`, `{overdue}`,
/// `{expiring}`, `{agent}` and `{date}`.
pub fn render_subject(template: &str, report: &Report, offset: FixedOffset) -> String {
    template
        .replace("{count}", &report.counts.unique_tickets.to_string())
        .replace("{new}", &report.counts.new.to_string())
        .replace("{overdue}", &report.counts.overdue.to_string())
        .replace("{expiring}", &report.counts.expiring.to_string())
        .replace("{agent}", &report.agent)
        .replace(
            "{date}",
            &report.generated_at.with_timezone(&offset).format("%Y-%m-%d").to_string(),
        )
}

/// Render the full report body, timestamps shown in `offset`.
pub fn render_text(report: &Report, offset: FixedOffset) -> String {
    let mut out = String::new();
    let c = &report.counts;

    let _ = writeln!(out, "Ticket digest for {}", report.agent);
    let _ = writeln!(out, "Generated {}", format_time(report.generated_at, offset));
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "New: {} | Overdue: {} | Expiring: {} | Unique tickets: {}",
        c.new, c.overdue, c.expiring, c.unique_tickets
    );
    if c.summaries_failed > 0 {
        let _ = writeln!(out, "Summaries unavailable for {} ticket(s)", c.summaries_failed);
    }

    if report.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "No tickets need attention.");
        return out;
    }

    for section in report.sections.iter().filter(|s| !s.is_empty()) {
        render_section(&mut out, section, report.generated_at, offset);
    }
    out
}

fn render_section(out: &mut String, section: &ReportSection, now: DateTime<Utc>, offset: FixedOffset) {
    let title = match section.category {
        TicketCategory::New => "NEW TICKETS",
        TicketCategory::Overdue => "OVERDUE TICKETS",
        TicketCategory::Expiring => "EXPIRING SOON",
    };
    let _ = writeln!(out);
    let _ = writeln!(out, "== {} ({}) ==", title, section.len());

    for entry in &section.entries {
        render_entry(out, section.category, entry, now, offset);
    }
}

fn render_entry(
    out: &mut String,
    category: TicketCategory,
    entry: &ReportEntry,
    now: DateTime<Utc>,
    offset: FixedOffset,
) {
    let t = &entry.ticket;
    let _ = writeln!(out);
    let _ = writeln!(out, "#{} - {}", t.number, t.subject);

    let mut details: Vec<String> = Vec::new();
    if let Some(client) = &t.client {
        details.push(format!("Client: {}", client));
    }
    if let Some(urgency) = t.urgency {
        details.push(format!("Urgency: {}", urgency));
    }
    if let Some(status) = &t.status {
        details.push(format!("Status: {}", status));
    }
    if !details.is_empty() {
        let _ = writeln!(out, "  {}", details.join(" | "));
    }
    let _ = writeln!(out, "  Created: {}", format_time(t.created_at, offset));

    match category {
        TicketCategory::Overdue => {
            if let Some(due) = t.sla_due {
                let _ = writeln!(
                    out,
                    "  Due: {} ({} day(s) late)",
                    format_time(due, offset),
                    entry.days_overdue
                );
            }
        }
        TicketCategory::Expiring => {
            if let (Some(due), Some(left)) = (t.sla_due, t.time_until_due(now)) {
                let _ = writeln!(
                    out,
                    "  Due: {} (in {}h{:02}m)",
                    format_time(due, offset),
                    left.num_hours(),
                    left.num_minutes() % 60
                );
            }
        }
        TicketCategory::New => {}
    }

    if entry.categories.len() > 1 {
        let tags: Vec<&str> = entry.categories.iter().map(|c| c.as_str()).collect();
        let _ = writeln!(out, "  Also listed as: {}", tags.join(", "));
    }

    match &entry.summary {
        SummaryOutcome::Generated { text } => {
            let _ = writeln!(out, "  Summary: {}", text);
        }
        SummaryOutcome::Unavailable { .. } => {
            let _ = writeln!(out, "  Summary: [summary unavailable]");
        }
        SummaryOutcome::Skipped => {}
    }
    if let Some(url) = &t.url {
        let _ = writeln!(out, "  Link: {}", url);
    }
}

fn format_time(time: DateTime<Utc>, offset: FixedOffset) -> String {
    time.with_timezone(&offset).format("%d/%m/%Y %H:%M").to_string()
}
