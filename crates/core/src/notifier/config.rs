//! Notifier configuration types.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SUBJECT_TEMPLATE: &str = "[Helpdesk] {count} ticket(s) need attention";

/// Delivery channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    /// Render and log the report (dry run).
    #[default]
    Log,
    /// Send a plain-text email through the SendGrid v3 API.
    #[serde(rename = "sendgrid")]
    SendGrid,
}

/// SendGrid settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendGridConfig {
    pub api_key: String,
    pub from_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    /// Recipients. When empty the report goes to its agent's address.
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.sendgrid.com".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Notifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sendgrid: Option<SendGridConfig>,
    /// Subject line; see `report::render_subject` for placeholders.
    #[serde(default = "default_subject_template")]
    pub subject_template: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            sendgrid: None,
            subject_template: default_subject_template(),
        }
    }
}

fn default_subject_template() -> String {
    DEFAULT_SUBJECT_TEMPLATE.to_string()
}
