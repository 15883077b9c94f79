//! Mock LLM client for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::summarizer::{CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage};

/// Injected failure for prompts containing `pattern`.
#[derive(Debug, Clone)]
struct FailureRule {
    pattern: String,
    /// `None` fails forever.
    remaining: Option<u32>,
    error: LlmError,
}

/// Mock implementation of the LlmClient trait.
///
/// Answers every prompt with a summary derived from the ticket subject line,
/// unless a failure rule matches the prompt.
///
/// # Example
///
/// ```rust,ignore
/// let client = Arc::new(MockLlmClient::new());
/// client
///     .fail_always("Printer", LlmError::Timeout(Duration::from_secs(30)))
///     .await;
///
/// // ... run the summarizer ...
/// assert_eq!(client.call_count().await, 8);
/// ```
#[derive(Debug, Default)]
pub struct MockLlmClient {
    /// Every prompt received, in call order.
    prompts: Arc<RwLock<Vec<String>>>,
    failures: Arc<RwLock<Vec<FailureRule>>>,
    /// Simulated latency per call.
    delay: Arc<RwLock<Option<Duration>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every prompt containing `pattern` fails with `error`.
    pub async fn fail_always(&self, pattern: &str, error: LlmError) {
        self.failures.write().await.push(FailureRule {
            pattern: pattern.to_string(),
            remaining: None,
            error,
        });
    }

    /// The next `times` prompts containing `pattern` fail with `error`.
    pub async fn fail_times(&self, pattern: &str, times: u32, error: LlmError) {
        self.failures.write().await.push(FailureRule {
            pattern: pattern.to_string(),
            remaining: Some(times),
            error,
        });
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    pub async fn call_count(&self) -> usize {
        self.prompts.read().await.len()
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.read().await.clone()
    }

    /// Number of calls whose prompt contained `pattern`.
    pub async fn prompts_containing(&self, pattern: &str) -> usize {
        self.prompts
            .read()
            .await
            .iter()
            .filter(|p| p.contains(pattern))
            .count()
    }

    async fn injected_failure(&self, prompt: &str) -> Option<LlmError> {
        let mut failures = self.failures.write().await;
        let rule = failures
            .iter_mut()
            .find(|r| prompt.contains(&r.pattern) && r.remaining != Some(0))?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.error.clone())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.prompts.write().await.push(request.prompt.clone());

        if let Some(delay) = *self.delay.read().await {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.injected_failure(&request.prompt).await {
            return Err(err);
        }

        let subject = request
            .prompt
            .lines()
            .find_map(|l| l.strip_prefix("SUBJECT: "))
            .unwrap_or("ticket");

        Ok(CompletionResponse {
            text: format!("Summary of {}.", subject),
            usage: LlmUsage {
                input_tokens: (request.prompt.len() / 4) as u32,
                output_tokens: 12,
            },
            model: "mock-model".to_string(),
        })
    }
}
