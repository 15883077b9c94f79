//! History of delivered reports.
//!
//! Every delivered report is recorded with its counts and the tickets of each
//! section, so a run can be compared with the previous one for the same agent.

mod sqlite;

pub use sqlite::SqliteReportHistory;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::report::{Report, ReportCounts};

/// Errors from the report history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for HistoryError {
    fn from(e: rusqlite::Error) -> Self {
        HistoryError::Database(e.to_string())
    }
}

/// A stored report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRecord {
    pub id: String,
    pub agent: String,
    pub generated_at: DateTime<Utc>,
    pub counts: ReportCounts,
    /// Notifier that accepted the report.
    pub delivered_via: String,
    pub ticket_ids: BTreeSet<String>,
}

/// Per-day totals for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub reports: u32,
    pub new: u32,
    pub overdue: u32,
    pub expiring: u32,
}

/// Differences between a report and the previous one for the same agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportComparison {
    pub diff_new: i64,
    pub diff_overdue: i64,
    pub diff_expiring: i64,
    /// Tickets listed now but not last time.
    pub appeared: Vec<String>,
    /// Tickets listed last time but gone now.
    pub cleared: Vec<String>,
}

impl ReportComparison {
    pub fn between(previous: &ReportRecord, current: &Report) -> Self {
        let current_ids: BTreeSet<String> = current.ticket_ids().into_iter().collect();
        Self {
            diff_new: current.counts.new as i64 - previous.counts.new as i64,
            diff_overdue: current.counts.overdue as i64 - previous.counts.overdue as i64,
            diff_expiring: current.counts.expiring as i64 - previous.counts.expiring as i64,
            appeared: current_ids.difference(&previous.ticket_ids).cloned().collect(),
            cleared: previous.ticket_ids.difference(&current_ids).cloned().collect(),
        }
    }
}

/// Storage for delivered reports.
pub trait ReportHistory: Send + Sync {
    /// Record a delivered report and its tickets.
    fn record(&self, report: &Report, delivered_via: &str) -> Result<(), HistoryError>;

    /// Most recent report for an agent.
    fn latest(&self, agent: &str) -> Result<Option<ReportRecord>, HistoryError>;

    /// Reports newest first, optionally for a single agent.
    fn list(&self, agent: Option<&str>, limit: usize) -> Result<Vec<ReportRecord>, HistoryError>;

    /// Daily totals since `since`, oldest day first.
    fn trends(&self, agent: &str, since: DateTime<Utc>) -> Result<Vec<DailyTotals>, HistoryError>;
}
