//! LLM client abstraction and implementations.

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::config::{LlmProvider, SummarizerConfig};
use crate::retry::Retryable;

/// Error type for LLM operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Setup problems (bad model, malformed request, bad credentials) that
    /// no amount of retrying can fix.
    pub fn is_config_error(&self) -> bool {
        match self {
            LlmError::NotConfigured(_) => true,
            LlmError::Api { status, message } => {
                matches!(status, 400 | 401 | 403 | 404 | 422)
                    || message.contains("model_decommissioned")
                    || message.contains("invalid_request_error")
                    || message.contains("model_not_found")
            }
            _ => false,
        }
    }
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        !self.is_config_error()
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Request for a completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (instructions for the model)
    pub system: Option<String>,
    /// User message
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,
    /// Nucleus sampling cutoff
    pub top_p: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 150,
            temperature: 0.3,
            top_p: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// Response from a completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The generated text
    pub text: String,
    /// Token usage
    pub usage: LlmUsage,
    /// Model used
    pub model: String,
}

/// Trait for LLM clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name (e.g., "groq", "openai", "ollama")
    fn provider(&self) -> &str;

    /// Model name (e.g., "llama-3.1-8b-instant")
    fn model(&self) -> &str;

    /// Send a completion request and get a text response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Create the client selected by the summarizer configuration.
pub fn create_llm_client(config: &SummarizerConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    if !config.enabled {
        return Ok(Arc::new(DisabledClient {
            model: config.model.clone(),
        }));
    }
    let timeout = Duration::from_secs(config.timeout_secs);
    let api_base = config
        .api_base
        .clone()
        .unwrap_or_else(|| config.provider.default_api_base().to_string());

    match config.provider {
        LlmProvider::Groq | LlmProvider::OpenAi => {
            let api_key = config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| LlmError::NotConfigured("summarizer.api_key is missing".into()))?;
            let provider = match config.provider {
                LlmProvider::Groq => "groq",
                _ => "openai",
            };
            Ok(Arc::new(
                OpenAiCompatibleClient::new(provider, api_key, &config.model, timeout)?
                    .with_api_base(api_base),
            ))
        }
        LlmProvider::Ollama => Ok(Arc::new(
            OllamaClient::new(&config.model, timeout)?.with_api_base(api_base),
        )),
    }
}

/// Stand-in used when summarization is switched off. Never reached by the
/// batch summarizer, which skips every ticket in that case.
struct DisabledClient {
    model: String,
}

#[async_trait]
impl LlmClient for DisabledClient {
    fn provider(&self) -> &str {
        "disabled"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::NotConfigured("summarization is disabled".into()))
    }
}

fn build_http_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Http(format!("Failed to create HTTP client: {}", e)))
}

fn map_send_error(e: reqwest::Error, timeout: Duration) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(timeout)
    } else {
        LlmError::Http(e.to_string())
    }
}

// ============================================================================
// OpenAI-compatible Implementation (Groq, OpenAI)
// ============================================================================

/// Client for OpenAI-compatible chat completion APIs.
pub struct OpenAiCompatibleClient {
    client: Client,
    provider: String,
    api_key: String,
    model: String,
    api_base: String,
    timeout: Duration,
}

impl OpenAiCompatibleClient {
    pub fn new(
        provider: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            provider: provider.into(),
            api_key: api_key.into(),
            model: model.into(),
            api_base: LlmProvider::OpenAi.default_api_base().to_string(),
            timeout,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    error: ChatErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ChatErrorDetail {
    message: String,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt,
        });

        let chat_request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        let status = response.status().as_u16();

        if status != 200 {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ChatError>(&error_text)
                .map(|e| {
                    // Keep type/code in the message so classification can see them.
                    let tags: Vec<String> = [e.error.error_type, e.error.code]
                        .into_iter()
                        .flatten()
                        .collect();
                    if tags.is_empty() {
                        e.error.message
                    } else {
                        format!("{} ({})", e.error.message, tags.join(", "))
                    }
                })
                .unwrap_or(error_text);
            if status == 429 {
                return Err(LlmError::RateLimited {
                    message,
                    retry_after,
                });
            }
            return Err(LlmError::Api { status, message });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Json(e.to_string()))?;

        let text = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Json("response has no choices".to_string()))?;
        let usage = chat_response
            .usage
            .map(|u| LlmUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            text,
            usage,
            model: chat_response.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

// ============================================================================
// Ollama Implementation
// ============================================================================

/// Ollama API client for local LLM inference.
///
/// Connects to a local Ollama server (default: http://localhost:11434).
/// No API key required.
pub struct OllamaClient {
    client: Client,
    model: String,
    api_base: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a new Ollama client with the specified model.
    pub fn new(model: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            model: model.into(),
            api_base: LlmProvider::Ollama.default_api_base().to_string(),
            timeout,
        })
    }

    /// Set a custom API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    /// Number of tokens in the response
    #[serde(default)]
    eval_count: u32,
    /// Number of tokens in the prompt
    #[serde(default)]
    prompt_eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let ollama_request = OllamaRequest {
            model: self.model.clone(),
            prompt: request.prompt,
            system: request.system,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
                top_p: request.top_p,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.api_base))
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        let status = response.status().as_u16();

        if status != 200 {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorResponse>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);
            return Err(LlmError::Api { status, message });
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Json(e.to_string()))?;

        Ok(CompletionResponse {
            text: ollama_response.response,
            usage: LlmUsage {
                input_tokens: ollama_response.prompt_eval_count,
                output_tokens: ollama_response.eval_count,
            },
            model: ollama_response.model,
        })
    }
}
