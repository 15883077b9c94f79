//! Query types for the ticket source.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::SourceError;
use crate::ticket::{CategoryWindows, Ticket, TicketCategory};

/// Hard cap on results per query accepted by the helpdesk API.
pub const MAX_RESULTS_CEILING: u32 = 50;

/// Datetime literal layout accepted in helpdesk filters.
const ODATA_DATETIME: &str = "%Y-%m-%dT%H:%M:%S.00Z";

/// One of the three per-run queries.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketQuery {
    pub category: TicketCategory,
    /// Agent identity (owner email) the query is scoped to.
    pub agent: String,
    /// Maximum result count, at most [`MAX_RESULTS_CEILING`].
    pub limit: u32,
    /// Reference time for the category predicate.
    pub now: DateTime<Utc>,
    pub windows: CategoryWindows,
}

impl TicketQuery {
    pub fn new(category: TicketCategory, agent: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            category,
            agent: agent.into(),
            limit: MAX_RESULTS_CEILING,
            now,
            windows: CategoryWindows::default(),
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_windows(mut self, windows: CategoryWindows) -> Self {
        self.windows = windows;
        self
    }

    /// The new, overdue and expiring queries for one agent, in that order.
    pub fn for_run(
        agent: &str,
        limit: u32,
        now: DateTime<Utc>,
        windows: CategoryWindows,
    ) -> Vec<TicketQuery> {
        TicketCategory::ALL
            .iter()
            .map(|category| {
                TicketQuery::new(*category, agent, now)
                    .with_limit(limit)
                    .with_windows(windows)
            })
            .collect()
    }

    /// Reject parameters that can never produce a valid request.
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.limit == 0 || self.limit > MAX_RESULTS_CEILING {
            return Err(SourceError::InvalidQuery(format!(
                "limit must be between 1 and {}, got {}",
                MAX_RESULTS_CEILING, self.limit
            )));
        }
        if self.agent.trim().is_empty() {
            return Err(SourceError::InvalidQuery("agent identity is empty".to_string()));
        }
        // The identity is embedded in a quoted filter literal.
        if self.agent.contains('\'') {
            return Err(SourceError::InvalidQuery(format!(
                "agent identity contains a quote: {}",
                self.agent
            )));
        }
        Ok(())
    }

    /// OData filter selecting the agent's open tickets, plus the creation
    /// cutoff for the new query.
    ///
    /// The category predicate itself is still evaluated locally by
    /// [`TicketQuery::matches`], since due dates live in several fields the
    /// API cannot filter on together.
    pub fn filter_expression(&self) -> String {
        let open = format!(
            "owner/email eq '{}' and baseStatus ne 'Closed' and baseStatus ne 'Resolved'",
            self.agent
        );
        match self.category {
            TicketCategory::New => format!(
                "{} and createdDate ge {}",
                open,
                self.created_cutoff().format(ODATA_DATETIME)
            ),
            TicketCategory::Overdue | TicketCategory::Expiring => open,
        }
    }

    /// Oldest creation time a new ticket can have.
    pub fn created_cutoff(&self) -> DateTime<Utc> {
        self.now - self.windows.new_within
    }

    pub fn order_by(&self) -> &'static str {
        match self.category {
            TicketCategory::New => "createdDate desc",
            TicketCategory::Overdue | TicketCategory::Expiring => "lastUpdate desc",
        }
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        ticket.matches(self.category, self.now, &self.windows)
    }
}

/// Tickets returned by one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub category: TicketCategory,
    pub tickets: Vec<Ticket>,
}

impl QueryResult {
    pub fn new(category: TicketCategory, tickets: Vec<Ticket>) -> Self {
        Self { category, tickets }
    }
}
