pub mod config;
mod db;
pub mod history;
pub mod metrics;
pub mod notifier;
pub mod pipeline;
pub mod rate_limiter;
pub mod report;
pub mod retry;
pub mod schedule;
pub mod source;
pub mod state;
pub mod summarizer;
pub mod testing;
pub mod ticket;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, NotifiedPolicy,
    SanitizedConfig,
};
pub use history::{ReportComparison, ReportHistory, ReportRecord, SqliteReportHistory};
pub use notifier::{create_notifier, DeliveryError, Notifier};
pub use pipeline::{
    AgentFailure, BatchRunSummary, DigestRunner, RunError, RunOutcome, RunSettings, RunStatus,
};
pub use report::{Report, ReportCounts};
pub use schedule::PollSchedule;
pub use source::{MovideskSource, SourceError, TicketQuery, TicketSource};
pub use state::{JsonStateStore, PollState, StateError, StateStore};
pub use summarizer::{BatchSummarizer, LlmClient, LlmError, SummaryOutcome};
pub use ticket::{CategorizedTicket, Ticket, TicketCategory, Urgency};
