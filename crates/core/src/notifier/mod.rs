//! Report delivery.
//!
//! A [`Notifier`] hands a finished [`Report`] to the outside world. The
//! pipeline only advances poll state after `deliver` returns `Ok`.

mod config;
mod log;
mod sendgrid;

pub use config::{NotifierConfig, NotifierKind, SendGridConfig, DEFAULT_SUBJECT_TEMPLATE};
pub use log::LogNotifier;
pub use sendgrid::SendGridNotifier;

use async_trait::async_trait;
use chrono::FixedOffset;
use std::sync::Arc;
use thiserror::Error;

use crate::report::Report;
use crate::retry::Retryable;

/// Errors from report delivery.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("Notifier not configured: {0}")]
    NotConfigured(String),

    #[error("Delivery transport error: {0}")]
    Transport(String),

    #[error("Delivery rejected: {status} - {message}")]
    Rejected { status: u16, message: String },
}

impl Retryable for DeliveryError {
    fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Transport(_) => true,
            DeliveryError::Rejected { status, .. } => *status == 429 || *status >= 500,
            DeliveryError::NotConfigured(_) => false,
        }
    }
}

/// Trait for report delivery channels.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Deliver one report. `Ok` means the channel accepted it.
    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError>;
}

/// Build the notifier selected by configuration.
pub fn create_notifier(
    config: &NotifierConfig,
    display_offset: FixedOffset,
) -> Result<Arc<dyn Notifier>, DeliveryError> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier::new(
            config.subject_template.clone(),
            display_offset,
        ))),
        NotifierKind::SendGrid => {
            let sendgrid = config.sendgrid.as_ref().ok_or_else(|| {
                DeliveryError::NotConfigured("notifier.sendgrid section is missing".to_string())
            })?;
            Ok(Arc::new(SendGridNotifier::new(
                sendgrid,
                config.subject_template.clone(),
                display_offset,
            )?))
        }
    }
}
