//! Types for the digest pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::{Config, NotifiedPolicy};
use crate::history::ReportComparison;
use crate::notifier::DeliveryError;
use crate::report::Report;
use crate::source::{SourceError, MAX_RESULTS_CEILING};
use crate::state::StateError;
use crate::summarizer::{SummarizeError, SummaryStats};
use crate::ticket::CategoryWindows;

/// Errors that abort a run for one agent. Nothing is delivered when one of
/// these is returned, except [`RunError::State`] raised after delivery.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("ticket source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("invalid ticket query: {0}")]
    InvalidQuery(String),

    #[error("{0}")]
    SummaryConfig(#[from] SummarizeError),

    #[error("report delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    /// A component could not be built from configuration.
    #[error("pipeline setup failed: {0}")]
    Setup(String),
}

impl From<SourceError> for RunError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Unavailable(msg) => RunError::SourceUnavailable(msg),
            SourceError::InvalidQuery(msg) => RunError::InvalidQuery(msg),
        }
    }
}

impl RunError {
    /// Pipeline stage the error came from, for logs and status.
    pub fn stage(&self) -> &'static str {
        match self {
            RunError::SourceUnavailable(_) | RunError::InvalidQuery(_) => "fetch",
            RunError::SummaryConfig(_) => "summarize",
            RunError::Delivery(_) => "deliver",
            RunError::State(_) => "state",
            RunError::Setup(_) => "setup",
        }
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Delivered with a summary (or a deliberate skip) for every ticket.
    Success,
    /// Delivered, but some tickets carry a placeholder.
    PartialFailure,
    /// Nothing to report and empty reports are not sent.
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::Skipped => "skipped",
        }
    }
}

/// Result of a run that did not fail.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub agent: String,
    pub status: RunStatus,
    pub report: Report,
    pub summary_stats: SummaryStats,
    /// Notifier that accepted the report; `None` when skipped.
    pub delivered_via: Option<String>,
    /// Difference with the previous delivered report, when history is on.
    pub comparison: Option<ReportComparison>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A failed run for one agent.
#[derive(Debug)]
pub struct AgentFailure {
    pub agent: String,
    pub error: RunError,
}

/// Results of running every configured agent once.
#[derive(Debug, Default)]
pub struct BatchRunSummary {
    pub outcomes: Vec<RunOutcome>,
    pub failures: Vec<AgentFailure>,
}

impl BatchRunSummary {
    fn count(&self, status: RunStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(RunStatus::Success)
    }

    pub fn partial(&self) -> usize {
        self.count(RunStatus::PartialFailure)
    }

    pub fn skipped(&self) -> usize {
        self.count(RunStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Per-run knobs taken from `[run]` and `[helpdesk]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub windows: CategoryWindows,
    /// Result cap for each category query.
    pub max_results: u32,
    pub notified_policy: NotifiedPolicy,
    pub notified_keep: usize,
    pub send_empty: bool,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            windows: CategoryWindows::from_hours(
                config.run.new_within_hours,
                config.run.expiring_within_hours,
            ),
            max_results: config.helpdesk.max_results,
            notified_policy: config.run.notified_policy,
            notified_keep: config.run.notified_keep,
            send_empty: config.run.send_empty,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            windows: CategoryWindows::default(),
            max_results: MAX_RESULTS_CEILING,
            notified_policy: NotifiedPolicy::default(),
            notified_keep: 1000,
            send_empty: true,
        }
    }
}
