use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::notifier::{NotifierConfig, NotifierKind};
use crate::retry::RetryConfig;
use crate::summarizer::{LlmProvider, SummarizerConfig};

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub helpdesk: HelpdeskConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Helpdesk (Movidesk) API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HelpdeskConfig {
    /// API base URL, without the `/tickets` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API token, sent as the `token` query parameter
    pub api_token: String,
    /// Link template for report entries; `{id}` is replaced with the ticket id
    #[serde(default)]
    pub ticket_url_template: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Requests allowed per quota window (default: 10)
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u32,
    /// Quota window length in seconds (default: 60)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Result cap for each of the three queries (at most 50)
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_helpdesk_retry")]
    pub retry: RetryConfig,
}

fn default_base_url() -> String {
    "https://api.movidesk.com/public/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_requests_per_window() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_results() -> u32 {
    50
}

// One attempt plus three retries.
fn default_helpdesk_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 4,
        ..RetryConfig::default()
    }
}

/// How tickets already present in a previous report are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifiedPolicy {
    /// Categories are re-derived every run; notified tickets are reported again.
    #[default]
    Include,
    /// Tickets already handed to the notifier are left out of later reports.
    Exclude,
}

/// Per-run behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Agent identities (helpdesk owner emails), one report each
    #[serde(default)]
    pub agents: Vec<String>,
    /// Tickets created within this many hours are "new" (default: 24)
    #[serde(default = "default_new_within_hours")]
    pub new_within_hours: i64,
    /// Tickets due within this many hours are "expiring" (default: 48)
    #[serde(default = "default_expiring_within_hours")]
    pub expiring_within_hours: i64,
    #[serde(default)]
    pub notified_policy: NotifiedPolicy,
    /// How many notified ticket ids to remember per agent (default: 1000)
    #[serde(default = "default_notified_keep")]
    pub notified_keep: usize,
    /// Deliver a report even when every section is empty (default: true)
    #[serde(default = "default_true")]
    pub send_empty: bool,
    /// UTC offset used when rendering times and evaluating business hours (default: -3)
    #[serde(default = "default_display_utc_offset_hours")]
    pub display_utc_offset_hours: i32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            new_within_hours: default_new_within_hours(),
            expiring_within_hours: default_expiring_within_hours(),
            notified_policy: NotifiedPolicy::default(),
            notified_keep: default_notified_keep(),
            send_empty: true,
            display_utc_offset_hours: default_display_utc_offset_hours(),
        }
    }
}

fn default_new_within_hours() -> i64 {
    24
}

fn default_expiring_within_hours() -> i64 {
    48
}

fn default_notified_keep() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_display_utc_offset_hours() -> i32 {
    -3
}

/// Local persistence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// JSON poll state file
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// SQLite database for the summary cache and report history
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Record every delivered report (default: true)
    #[serde(default = "default_true")]
    pub history: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            database_path: default_database_path(),
            history: true,
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/state.json")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/digest.db")
}

/// Scheduled mode
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Start of business hours, `HH:MM` in the display offset
    #[serde(default = "default_business_hours_start")]
    pub business_hours_start: String,
    /// End of business hours, `HH:MM` in the display offset
    #[serde(default = "default_business_hours_end")]
    pub business_hours_end: String,
    #[serde(default = "default_business_interval_mins")]
    pub business_interval_mins: u64,
    #[serde(default = "default_off_hours_interval_mins")]
    pub off_hours_interval_mins: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: default_port(),
            business_hours_start: default_business_hours_start(),
            business_hours_end: default_business_hours_end(),
            business_interval_mins: default_business_interval_mins(),
            off_hours_interval_mins: default_off_hours_interval_mins(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_business_hours_start() -> String {
    "07:01".to_string()
}

fn default_business_hours_end() -> String {
    "18:59".to_string()
}

fn default_business_interval_mins() -> u64 {
    6
}

fn default_off_hours_interval_mins() -> u64 {
    2
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub helpdesk: SanitizedHelpdeskConfig,
    pub run: RunConfig,
    pub summarizer: SanitizedSummarizerConfig,
    pub notifier: SanitizedNotifierConfig,
    pub storage: StorageConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedHelpdeskConfig {
    pub base_url: String,
    pub api_token_configured: bool,
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub max_results: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSummarizerConfig {
    pub enabled: bool,
    pub provider: LlmProvider,
    pub model: String,
    pub api_key_configured: bool,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub requests_per_minute: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    pub persistent_cache: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNotifierConfig {
    pub kind: NotifierKind,
    pub api_key_configured: bool,
    pub from_email: Option<String>,
    pub recipients: Vec<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let sendgrid = config.notifier.sendgrid.as_ref();
        Self {
            helpdesk: SanitizedHelpdeskConfig {
                base_url: config.helpdesk.base_url.clone(),
                api_token_configured: !config.helpdesk.api_token.is_empty(),
                requests_per_window: config.helpdesk.requests_per_window,
                window_secs: config.helpdesk.window_secs,
                max_results: config.helpdesk.max_results,
            },
            run: config.run.clone(),
            summarizer: SanitizedSummarizerConfig {
                enabled: config.summarizer.enabled,
                provider: config.summarizer.provider,
                model: config.summarizer.model.clone(),
                api_key_configured: config
                    .summarizer
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
                batch_size: config.summarizer.batch_size,
                batch_delay_ms: config.summarizer.batch_delay_ms,
                requests_per_minute: config.summarizer.requests_per_minute,
                max_tokens: config.summarizer.max_tokens,
                temperature: config.summarizer.temperature,
                persistent_cache: config.summarizer.cache.persistent,
            },
            notifier: SanitizedNotifierConfig {
                kind: config.notifier.kind,
                api_key_configured: sendgrid.is_some_and(|s| !s.api_key.is_empty()),
                from_email: sendgrid.map(|s| s.from_email.clone()),
                recipients: sendgrid.map(|s| s.to.clone()).unwrap_or_default(),
            },
            storage: config.storage.clone(),
            daemon: config.daemon.clone(),
        }
    }
}
