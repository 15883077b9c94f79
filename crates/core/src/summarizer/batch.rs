//! Batch summarization of a run's deduplicated tickets.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cache::{fingerprint, CachedSummary, RunCache, SummaryStore};
use super::config::{SummarizerConfig, CONTENT_PLACEHOLDER};
use super::excerpt::{build_excerpt, ExcerptLimits};
use super::llm::{CompletionRequest, LlmClient, LlmError};
use crate::metrics;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::ticket::CategorizedTicket;

/// Result of summarizing one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SummaryOutcome {
    Generated { text: String },
    /// Placeholder: a summary was wanted but could not be produced.
    Unavailable { reason: String },
    /// Not eligible for summarization by configuration.
    Skipped,
}

impl SummaryOutcome {
    pub fn generated(text: impl Into<String>) -> Self {
        SummaryOutcome::Generated { text: text.into() }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        SummaryOutcome::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            SummaryOutcome::Generated { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, SummaryOutcome::Unavailable { .. })
    }
}

/// Errors that abort a summarization run.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// The model, request shape or credentials are wrong; every other ticket
    /// would fail the same way.
    #[error("Summarizer configuration error (ticket {ticket_id}): {source}")]
    Config {
        ticket_id: String,
        #[source]
        source: LlmError,
    },
}

/// Counters for one summarization run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryStats {
    pub batches: usize,
    pub batch_sizes: Vec<usize>,
    pub inter_batch_delays: usize,
    /// Network calls made, retries included.
    pub requests: u32,
    pub run_cache_hits: usize,
    pub store_hits: usize,
    pub generated: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Outcomes keyed by ticket id plus run counters.
#[derive(Debug, Clone, Default)]
pub struct SummaryRun {
    pub outcomes: HashMap<String, SummaryOutcome>,
    pub stats: SummaryStats,
}

/// Sizes of the consecutive batches `total` tickets are split into.
pub fn batch_sizes(total: usize, size: usize) -> Vec<usize> {
    let size = size.max(1);
    (0..total)
        .step_by(size)
        .map(|start| (total - start).min(size))
        .collect()
}

/// A ticket waiting for a network call.
struct Pending<'a> {
    ticket: &'a CategorizedTicket,
    prompt: String,
    fingerprint: String,
}

/// Drives the LLM over a run's tickets in throttled batches.
pub struct BatchSummarizer {
    client: Arc<dyn LlmClient>,
    config: SummarizerConfig,
    limits: ExcerptLimits,
    limiter: RateLimiter,
    retry: RetryPolicy,
    store: Option<Arc<dyn SummaryStore>>,
}

impl BatchSummarizer {
    pub fn new(client: Arc<dyn LlmClient>, config: SummarizerConfig) -> Self {
        Self {
            limits: ExcerptLimits::from(&config),
            limiter: RateLimiter::per_minute("llm", config.requests_per_minute),
            retry: RetryPolicy::from(&config.retry),
            client,
            config,
            store: None,
        }
    }

    /// Back the run cache with a persistent store.
    pub fn with_store(mut self, store: Arc<dyn SummaryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    fn is_eligible(&self, ticket: &CategorizedTicket) -> bool {
        self.config.enabled
            && ticket
                .categories
                .iter()
                .any(|c| self.config.summarize_categories.contains(c))
    }

    /// Produce an outcome for every unique ticket in `tickets`.
    ///
    /// Cache hits and ineligible tickets are resolved up front; the rest are
    /// summarized in batches of `batch_size` separated by `batch_delay_ms`.
    pub async fn summarize(
        &self,
        tickets: &[CategorizedTicket],
        cache: &mut RunCache,
        now: DateTime<Utc>,
    ) -> Result<SummaryRun, SummarizeError> {
        let mut run = SummaryRun::default();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut pending: Vec<Pending<'_>> = Vec::new();

        for ticket in tickets {
            if !seen.insert(ticket.id()) {
                continue;
            }
            if let Some(outcome) = self.resolve_without_call(ticket, cache, &mut run.stats) {
                run.outcomes.insert(ticket.id().to_string(), outcome);
                continue;
            }
            let excerpt = build_excerpt(ticket, &self.limits);
            if excerpt.trim().chars().count() < self.config.min_content_chars {
                warn!(ticket_id = %ticket.id(), "Insufficient content for summary");
                metrics::SUMMARIES.with_label_values(&["unavailable"]).inc();
                run.stats.failed += 1;
                run.outcomes.insert(
                    ticket.id().to_string(),
                    SummaryOutcome::unavailable("insufficient content"),
                );
                continue;
            }
            let prompt = self.config.prompt_template.replace(CONTENT_PLACEHOLDER, &excerpt);
            let fingerprint = fingerprint(&self.config.model, &prompt);

            if let Some(summary) = self.stored_summary(ticket.id(), &fingerprint, now) {
                metrics::SUMMARIES.with_label_values(&["cached"]).inc();
                run.stats.store_hits += 1;
                cache.insert(ticket.id(), summary.clone());
                run.outcomes
                    .insert(ticket.id().to_string(), SummaryOutcome::generated(summary));
                continue;
            }

            pending.push(Pending {
                ticket,
                prompt,
                fingerprint,
            });
        }

        let sizes = batch_sizes(pending.len(), self.config.batch_size);
        let batch_delay = Duration::from_millis(self.config.batch_delay_ms);
        let concurrency = self.config.max_concurrency.max(1);

        for (index, batch) in pending.chunks(self.config.batch_size.max(1)).enumerate() {
            if index > 0 {
                debug!(delay_ms = self.config.batch_delay_ms, "Waiting between batches");
                tokio::time::sleep(batch_delay).await;
                run.stats.inter_batch_delays += 1;
            }

            info!(
                batch = index + 1,
                batches = sizes.len(),
                size = batch.len(),
                "Summarizing batch"
            );
            run.stats.batches += 1;
            run.stats.batch_sizes.push(batch.len());
            metrics::SUMMARY_BATCHES.inc();

            let calls: Vec<_> = batch
                .iter()
                .map(|item| async move { (item, self.summarize_one(&item.prompt).await) })
                .collect();
            let mut results = stream::iter(calls).buffer_unordered(concurrency);

            while let Some((item, (result, calls))) = results.next().await {
                run.stats.requests += calls;
                let ticket_id = item.ticket.id();
                match result {
                    Ok(summary) => {
                        self.persist(item, &summary, now);
                        cache.insert(ticket_id, summary.clone());
                        metrics::SUMMARIES.with_label_values(&["generated"]).inc();
                        run.stats.generated += 1;
                        run.outcomes
                            .insert(ticket_id.to_string(), SummaryOutcome::generated(summary));
                    }
                    Err(e) if e.is_config_error() => {
                        warn!(ticket_id = %ticket_id, error = %e, "Summarizer configuration error, aborting run");
                        return Err(SummarizeError::Config {
                            ticket_id: ticket_id.to_string(),
                            source: e,
                        });
                    }
                    Err(e) => {
                        warn!(ticket_id = %ticket_id, error = %e, "Summary unavailable after retries");
                        metrics::SUMMARIES.with_label_values(&["unavailable"]).inc();
                        run.stats.failed += 1;
                        run.outcomes
                            .insert(ticket_id.to_string(), SummaryOutcome::unavailable(e.to_string()));
                    }
                }
            }
        }

        info!(
            generated = run.stats.generated,
            failed = run.stats.failed,
            skipped = run.stats.skipped,
            cache_hits = run.stats.run_cache_hits + run.stats.store_hits,
            requests = run.stats.requests,
            "Summarization finished"
        );

        Ok(run)
    }

    /// Outcome available without building a prompt: skipped or run-cache hit.
    fn resolve_without_call(
        &self,
        ticket: &CategorizedTicket,
        cache: &RunCache,
        stats: &mut SummaryStats,
    ) -> Option<SummaryOutcome> {
        if !self.is_eligible(ticket) {
            metrics::SUMMARIES.with_label_values(&["skipped"]).inc();
            stats.skipped += 1;
            return Some(SummaryOutcome::Skipped);
        }
        let summary = cache.get(ticket.id())?;
        debug!(ticket_id = %ticket.id(), "Using run cache");
        metrics::SUMMARIES.with_label_values(&["cached"]).inc();
        stats.run_cache_hits += 1;
        Some(SummaryOutcome::generated(summary))
    }

    fn stored_summary(&self, ticket_id: &str, fingerprint: &str, now: DateTime<Utc>) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.get(ticket_id, fingerprint, now) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(ticket_id = %ticket_id, error = %e, "Summary cache lookup failed");
                None
            }
        }
    }

    fn persist(&self, item: &Pending<'_>, summary: &str, now: DateTime<Utc>) {
        let Some(store) = &self.store else {
            return;
        };
        let entry = CachedSummary {
            ticket_id: item.ticket.id().to_string(),
            ticket_number: item.ticket.ticket.number.clone(),
            fingerprint: item.fingerprint.clone(),
            summary: summary.to_string(),
            model: self.client.model().to_string(),
            generated_at: now,
        };
        if let Err(e) = store.put(&entry) {
            warn!(ticket_id = %entry.ticket_id, error = %e, "Failed to persist summary");
        }
    }

    /// Summarize one prompt with retries. Also returns the number of calls made.
    async fn summarize_one(&self, prompt: &str) -> (Result<String, LlmError>, u32) {
        let mut calls = 0;
        let result = self
            .retry
            .run("summarize", |attempt| {
                calls = attempt;
                self.request(prompt)
            })
            .await;
        (result, calls)
    }

    async fn request(&self, prompt: &str) -> Result<String, LlmError> {
        self.limiter.acquire().await;

        let request = CompletionRequest::new(prompt)
            .with_system(self.config.system_prompt.clone())
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
            .with_top_p(self.config.top_p);

        let provider = self.client.provider().to_string();
        let start = Instant::now();
        let result = self.client.complete(request).await;
        metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&["llm"])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                metrics::LLM_REQUESTS
                    .with_label_values(&[provider.as_str(), "success"])
                    .inc();
                metrics::LLM_TOKENS
                    .with_label_values(&[provider.as_str(), "input"])
                    .inc_by(response.usage.input_tokens as u64);
                metrics::LLM_TOKENS
                    .with_label_values(&[provider.as_str(), "output"])
                    .inc_by(response.usage.output_tokens as u64);

                let text = response.text.trim();
                if text.is_empty() {
                    return Err(LlmError::Json("empty summary".to_string()));
                }
                Ok(text.to_string())
            }
            Err(e) => {
                metrics::LLM_REQUESTS
                    .with_label_values(&[provider.as_str(), "error"])
                    .inc();
                Err(e)
            }
        }
    }
}
