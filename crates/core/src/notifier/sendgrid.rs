//! SendGrid email notifier.
//!
//! Sends the rendered report as a plain-text message through the v3
//! `mail/send` endpoint. SendGrid answers 202 when it accepts a message.

use async_trait::async_trait;
use chrono::FixedOffset;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;

use super::config::SendGridConfig;
use super::{DeliveryError, Notifier};
use crate::metrics;
use crate::report::{render_subject, render_text, Report};
use crate::retry::RetryPolicy;

/// SendGrid v3 API notifier.
pub struct SendGridNotifier {
    client: Client,
    api_key: String,
    api_base: String,
    from_email: String,
    from_name: Option<String>,
    to: Vec<String>,
    subject_template: String,
    display_offset: FixedOffset,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: String,
    content: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: String,
}

impl SendGridNotifier {
    pub fn new(
        config: &SendGridConfig,
        subject_template: impl Into<String>,
        display_offset: FixedOffset,
    ) -> Result<Self, DeliveryError> {
        if config.api_key.is_empty() || config.from_email.is_empty() {
            return Err(DeliveryError::NotConfigured(
                "sendgrid api_key and from_email are required".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DeliveryError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            to: config.to.clone(),
            subject_template: subject_template.into(),
            display_offset,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Configured recipients, or the report's agent when none are set.
    fn recipients<'a>(&'a self, report: &'a Report) -> Vec<&'a str> {
        if self.to.is_empty() {
            vec![report.agent.as_str()]
        } else {
            self.to.iter().map(String::as_str).collect()
        }
    }

    fn build_request<'a>(&'a self, report: &'a Report) -> MailRequest<'a> {
        MailRequest {
            personalizations: vec![Personalization {
                to: self
                    .recipients(report)
                    .into_iter()
                    .map(|email| Address { email, name: None })
                    .collect(),
            }],
            from: Address {
                email: &self.from_email,
                name: self.from_name.as_deref(),
            },
            subject: render_subject(&self.subject_template, report, self.display_offset),
            content: vec![Content {
                content_type: "text/plain",
                value: render_text(report, self.display_offset),
            }],
        }
    }

    async fn send_once(&self, request: &MailRequest<'_>) -> Result<(), DeliveryError> {
        let start = Instant::now();
        let result = self
            .client
            .post(format!("{}/v3/mail/send", self.api_base))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await;
        metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&["sendgrid"])
            .observe(start.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["sendgrid", "transport_error"])
                .inc();
            DeliveryError::Transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["sendgrid", &status.to_string()])
            .inc();

        if response.status().is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status,
            message: body.chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    fn name(&self) -> &str {
        "sendgrid"
    }

    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        let request = self.build_request(report);
        self.retry
            .run("sendgrid_send", |_| self.send_once(&request))
            .await?;
        info!(
            agent = %report.agent,
            report_id = %report.id,
            recipients = request.personalizations[0].to.len(),
            "Report emailed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::assemble;
    use crate::testing::fixtures;
    use std::collections::HashMap;

    fn config() -> SendGridConfig {
        SendGridConfig {
            api_key: "SG.test".to_string(),
            from_email: "digest@example.com".to_string(),
            from_name: Some("Ticket Digest".to_string()),
            to: Vec::new(),
            api_base: "https://api.sendgrid.com/".to_string(),
            timeout_secs: 5,
        }
    }

    fn offset() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    #[test]
    fn test_rejects_missing_credentials() {
        let mut cfg = config();
        cfg.api_key.clear();
        assert!(matches!(
            SendGridNotifier::new(&cfg, "s", offset()),
            Err(DeliveryError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_request_defaults_to_agent_address() {
        let notifier = SendGridNotifier::new(&config(), "{count} tickets", offset()).unwrap();
        let report = assemble("agent@example.com", fixtures::now(), &[], &HashMap::new(), fixtures::now());

        let json = serde_json::to_value(notifier.build_request(&report)).unwrap();
        assert_eq!(json["personalizations"][0]["to"][0]["email"], "agent@example.com");
        assert_eq!(json["from"]["name"], "Ticket Digest");
        assert_eq!(json["subject"], "0 tickets");
        assert_eq!(json["content"][0]["type"], "text/plain");
        assert_eq!(notifier.api_base, "https://api.sendgrid.com");
    }

    #[test]
    fn test_configured_recipients_override_agent() {
        let mut cfg = config();
        cfg.to = vec!["lead@example.com".into(), "ops@example.com".into()];
        let notifier = SendGridNotifier::new(&cfg, "s", offset()).unwrap();
        let report = assemble("agent@example.com", fixtures::now(), &[], &HashMap::new(), fixtures::now());

        assert_eq!(
            notifier.recipients(&report),
            vec!["lead@example.com", "ops@example.com"]
        );
    }
}
