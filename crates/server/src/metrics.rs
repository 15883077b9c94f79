//! Prometheus metrics for observability.
//!
//! This module provides the server-side metrics and the registry:
//! - HTTP request metrics (latency, counts, in flight)
//! - Daemon schedule and per-agent freshness
//! - Every digest metric exported by `digest_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "digest_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("digest_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "digest_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Daemon Metrics
// =============================================================================

/// 1 while inside business hours.
pub static DAEMON_BUSINESS_HOURS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "digest_daemon_business_hours",
        "Whether the daemon is in business hours",
    )
    .unwrap()
});

/// Seconds until the next scheduled batch.
pub static DAEMON_NEXT_RUN_SECONDS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "digest_daemon_next_run_seconds",
        "Seconds until the next scheduled digest batch",
    )
    .unwrap()
});

/// Unix time of the last delivered report per agent.
pub static AGENT_LAST_SUCCESS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "digest_agent_last_delivery_timestamp_seconds",
            "Unix time of the last delivered report",
        ),
        &["agent"],
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(DAEMON_BUSINESS_HOURS.clone()))
        .unwrap();
    registry
        .register(Box::new(DAEMON_NEXT_RUN_SECONDS.clone()))
        .unwrap();
    registry
        .register(Box::new(AGENT_LAST_SUCCESS.clone()))
        .unwrap();

    for metric in digest_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics in the Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

static EMAIL_SEGMENT: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/[^/@]+@[^/]+").unwrap());
static NUMERIC_SEGMENT: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace agents and ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = EMAIL_SEGMENT.replace_all(path, "/{agent}");
    let result = NUMERIC_SEGMENT.replace_all(&result, "/{id}$1");
    result.to_string()
}
