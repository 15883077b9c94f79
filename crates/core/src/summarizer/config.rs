//! Summarizer configuration types.

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;
use crate::ticket::TicketCategory;

/// Placeholder in the prompt template replaced by the ticket excerpt.
pub const CONTENT_PLACEHOLDER: &str = "{ticket_content}";

/// LLM provider type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Groq cloud (OpenAI-compatible API).
    #[default]
    Groq,
    /// OpenAI API or any OpenAI-compatible endpoint.
    #[serde(rename = "openai")]
    OpenAi,
    /// Local Ollama instance.
    Ollama,
}

impl LlmProvider {
    pub fn default_api_base(&self) -> &'static str {
        match self {
            LlmProvider::Groq => "https://api.groq.com/openai/v1",
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Ollama => "http://localhost:11434",
        }
    }
}

/// Persistent summary cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryCacheConfig {
    /// Keep summaries in SQLite across runs (default: true)
    #[serde(default = "default_true")]
    pub persistent: bool,
    /// Entries older than this are regenerated (default: 7)
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
}

impl Default for SummaryCacheConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            ttl_days: default_ttl_days(),
        }
    }
}

/// Batch summarizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// When false every ticket is reported without a summary.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom API base URL (for proxies or self-hosted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum output tokens per summary.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Tickets per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between consecutive batches.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Concurrent requests inside one batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Interactions included in the excerpt, newest first.
    #[serde(default = "default_interactions")]
    pub interactions: usize,
    #[serde(default = "default_interaction_max_chars")]
    pub interaction_max_chars: usize,
    #[serde(default = "default_excerpt_max_chars")]
    pub excerpt_max_chars: usize,
    /// Excerpts shorter than this are not sent.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Only tickets carrying one of these categories are summarized.
    #[serde(default = "default_summarize_categories")]
    pub summarize_categories: Vec<TicketCategory>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: SummaryCacheConfig,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: LlmProvider::default(),
            model: default_model(),
            api_key: None,
            api_base: None,
            timeout_secs: default_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            max_concurrency: default_max_concurrency(),
            requests_per_minute: default_requests_per_minute(),
            interactions: default_interactions(),
            interaction_max_chars: default_interaction_max_chars(),
            excerpt_max_chars: default_excerpt_max_chars(),
            min_content_chars: default_min_content_chars(),
            prompt_template: default_prompt_template(),
            system_prompt: default_system_prompt(),
            summarize_categories: default_summarize_categories(),
            retry: RetryConfig::default(),
            cache: SummaryCacheConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl_days() -> i64 {
    7
}

fn default_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    150
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.9
}

fn default_batch_size() -> usize {
    8
}

fn default_batch_delay_ms() -> u64 {
    2000
}

fn default_max_concurrency() -> usize {
    1
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_interactions() -> usize {
    5
}

fn default_interaction_max_chars() -> usize {
    600
}

fn default_excerpt_max_chars() -> usize {
    3500
}

fn default_min_content_chars() -> usize {
    50
}

fn default_prompt_template() -> String {
    "Summarize this support ticket in 2-3 sentences. State the problem, \
what has been done so far and what is pending.\n\n{ticket_content}"
        .to_string()
}

fn default_system_prompt() -> String {
    "You are an assistant that summarizes technical support tickets concisely and objectively."
        .to_string()
}

fn default_summarize_categories() -> Vec<TicketCategory> {
    TicketCategory::ALL.to_vec()
}
