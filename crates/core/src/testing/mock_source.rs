//! Mock ticket source for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::source::{SourceError, TicketQuery, TicketSource};
use crate::ticket::{Ticket, TicketCategory};

/// Mock implementation of the TicketSource trait.
///
/// Returns canned tickets per category and records every query.
///
/// # Example
///
/// ```rust,ignore
/// use digest_core::testing::{fixtures, MockTicketSource};
///
/// let source = MockTicketSource::new();
/// source
///     .set_results(TicketCategory::New, vec![fixtures::new_ticket("1", 2)])
///     .await;
///
/// let tickets = source.fetch(&query).await?;
/// assert_eq!(source.query_count().await, 1);
/// ```
#[derive(Debug, Default)]
pub struct MockTicketSource {
    /// Tickets returned per category.
    results: Arc<RwLock<HashMap<TicketCategory, Vec<Ticket>>>>,
    /// Persistent per-category failures.
    errors: Arc<RwLock<HashMap<TicketCategory, SourceError>>>,
    /// If set, the next fetch fails with this error.
    next_error: Arc<RwLock<Option<SourceError>>>,
    /// Recorded queries.
    queries: Arc<RwLock<Vec<TicketQuery>>>,
}

impl MockTicketSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tickets returned for a category.
    pub async fn set_results(&self, category: TicketCategory, tickets: Vec<Ticket>) {
        self.results.write().await.insert(category, tickets);
    }

    /// Make every fetch for `category` fail.
    pub async fn set_error(&self, category: TicketCategory, error: SourceError) {
        self.errors.write().await.insert(category, error);
    }

    /// Configure the next fetch to fail with the given error.
    pub async fn set_next_error(&self, error: SourceError) {
        *self.next_error.write().await = Some(error);
    }

    /// Get recorded queries.
    pub async fn recorded_queries(&self) -> Vec<TicketQuery> {
        self.queries.read().await.clone()
    }

    pub async fn query_count(&self) -> usize {
        self.queries.read().await.len()
    }
}

#[async_trait]
impl TicketSource for MockTicketSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, query: &TicketQuery) -> Result<Vec<Ticket>, SourceError> {
        self.queries.write().await.push(query.clone());

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        if let Some(err) = self.errors.read().await.get(&query.category) {
            return Err(err.clone());
        }
        query.validate()?;

        let results = self.results.read().await;
        Ok(results
            .get(&query.category)
            .map(|tickets| tickets.iter().take(query.limit as usize).cloned().collect())
            .unwrap_or_default())
    }
}
