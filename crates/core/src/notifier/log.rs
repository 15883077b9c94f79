//! Log-only notifier for dry runs.

use async_trait::async_trait;
use chrono::FixedOffset;
use tracing::info;

use super::{DeliveryError, Notifier};
use crate::report::{render_subject, render_text, Report};

/// Renders the report and writes it to the log instead of sending it.
pub struct LogNotifier {
    subject_template: String,
    display_offset: FixedOffset,
}

impl LogNotifier {
    pub fn new(subject_template: impl Into<String>, display_offset: FixedOffset) -> Self {
        Self {
            subject_template: subject_template.into(),
            display_offset,
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        let subject = render_subject(&self.subject_template, report, self.display_offset);
        let body = render_text(report, self.display_offset);
        info!(
            agent = %report.agent,
            report_id = %report.id,
            tickets = report.counts.unique_tickets,
            subject = %subject,
            "Dry run, report not sent\n{}",
            body
        );
        Ok(())
    }
}
