//! Ticket source abstraction.
//!
//! A [`TicketSource`] answers one [`TicketQuery`] at a time. Sources enforce
//! their own quota and retry policy; they do not deduplicate across queries,
//! that is [`deduplicate`]'s job.

mod dedup;
mod movidesk;
mod types;

pub use dedup::deduplicate;
pub use movidesk::MovideskSource;
pub use types::{QueryResult, TicketQuery, MAX_RESULTS_CEILING};

use async_trait::async_trait;
use thiserror::Error;

use crate::ticket::Ticket;

/// Errors from a ticket source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Unreachable, failing after retries, or rejecting our credentials.
    #[error("Ticket source unavailable: {0}")]
    Unavailable(String),

    /// Malformed query parameters; retrying cannot help.
    #[error("Invalid ticket query: {0}")]
    InvalidQuery(String),
}

/// Trait for ticket sources.
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Source name for logs and metrics.
    fn name(&self) -> &str;

    /// Fetch the tickets matching `query`, at most `query.limit` of them.
    async fn fetch(&self, query: &TicketQuery) -> Result<Vec<Ticket>, SourceError>;
}
