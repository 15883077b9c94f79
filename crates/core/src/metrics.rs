//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Digest runs (results, durations, tickets fetched, reports delivered)
//! - Summarization (outcomes, batches, LLM requests and tokens)
//! - External services (helpdesk, LLM, mail) and the shared retry/quota plumbing

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Digest runs
// =============================================================================

/// Digest runs total by result.
pub static DIGEST_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("digest_runs_total", "Total digest runs"),
        &["result"], // "success", "partial_failure", "skipped", "failed"
    )
    .unwrap()
});

/// Digest run duration in seconds.
pub static RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("digest_run_duration_seconds", "Duration of a digest run")
            .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["result"],
    )
    .unwrap()
});

/// Tickets returned per category query.
pub static TICKETS_FETCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("digest_tickets_fetched_total", "Tickets returned by category queries"),
        &["category"],
    )
    .unwrap()
});

/// Reports accepted by the notifier.
pub static REPORTS_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("digest_reports_delivered_total", "Reports delivered").unwrap()
});

// =============================================================================
// Summarization
// =============================================================================

/// Summary outcomes by result.
pub static SUMMARIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("digest_summaries_total", "Summary outcomes"),
        &["result"], // "generated", "cached", "unavailable", "skipped"
    )
    .unwrap()
});

/// Summarization batches processed.
pub static SUMMARY_BATCHES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("digest_summary_batches_total", "Summarization batches processed").unwrap()
});

/// LLM requests by provider and outcome.
pub static LLM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("digest_llm_requests_total", "Total LLM requests"),
        &["provider", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// LLM tokens used.
pub static LLM_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("digest_llm_tokens_total", "Total LLM tokens used"),
        &["provider", "direction"], // direction: "input", "output"
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "digest_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "digest_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "status"], // status: HTTP code or "transport_error"
    )
    .unwrap()
});

/// Retry attempts by operation.
pub static RETRY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("digest_retry_attempts_total", "Retries after transient failures"),
        &["operation"],
    )
    .unwrap()
});

/// Times a caller had to wait for quota.
pub static RATE_LIMIT_WAITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("digest_rate_limit_waits_total", "Waits caused by a rate limiter"),
        &["limiter"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Runs
        Box::new(DIGEST_RUNS.clone()),
        Box::new(RUN_DURATION.clone()),
        Box::new(TICKETS_FETCHED.clone()),
        Box::new(REPORTS_DELIVERED.clone()),
        // Summarization
        Box::new(SUMMARIES.clone()),
        Box::new(SUMMARY_BATCHES.clone()),
        Box::new(LLM_REQUESTS.clone()),
        Box::new(LLM_TOKENS.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        Box::new(RATE_LIMIT_WAITS.clone()),
    ]
}
