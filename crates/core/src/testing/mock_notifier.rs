//! Mock notifier for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::notifier::{DeliveryError, Notifier};
use crate::report::Report;

/// Mock implementation of the Notifier trait.
///
/// Records delivered reports; can be told to reject the next delivery or all of them.
#[derive(Debug, Default)]
pub struct MockNotifier {
    delivered: Arc<RwLock<Vec<Report>>>,
    /// If set, the next delivery fails with this error.
    next_error: Arc<RwLock<Option<DeliveryError>>>,
    /// If set, every delivery fails with this error.
    always_error: Arc<RwLock<Option<DeliveryError>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_next_error(&self, error: DeliveryError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn fail_always(&self, error: DeliveryError) {
        *self.always_error.write().await = Some(error);
    }

    /// Reports accepted so far.
    pub async fn delivered(&self) -> Vec<Report> {
        self.delivered.read().await.clone()
    }

    pub async fn delivery_count(&self) -> usize {
        self.delivered.read().await.len()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        if let Some(err) = self.always_error.read().await.clone() {
            return Err(err);
        }
        self.delivered.write().await.push(report.clone());
        Ok(())
    }
}
