//! Bounded retry with exponential backoff.
//!
//! Callers classify their errors through [`Retryable`]; the policy decides how
//! long to wait and when to give up.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::metrics;

/// Error classification used by [`RetryPolicy::run`].
pub trait Retryable {
    /// Whether another attempt could succeed.
    fn is_retryable(&self) -> bool;

    /// Minimum wait requested by the remote side (e.g. `Retry-After`).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Retry configuration as it appears in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failed attempt in milliseconds (default: 1000)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound for the computed backoff in milliseconds (default: 60000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff multiplier (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Explicit retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.backoff_multiplier,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Self::default()
        }
    }

    /// A policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Backoff to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() || attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    let backoff = self.delay_for(attempt);
                    let delay = e.retry_after().map_or(backoff, |hint| hint.max(backoff));
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient failure"
                    );
                    metrics::RETRY_ATTEMPTS
                        .with_label_values(&[operation])
                        .inc();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug)]
    enum TestError {
        Transient,
        Fatal,
        Throttled(Duration),
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            !matches!(self, TestError::Fatal)
        }

        fn retry_after(&self) -> Option<Duration> {
            match self {
                TestError::Throttled(d) => Some(*d),
                _ => None,
            }
        }
    }

    #[test]
    fn test_delay_for_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig {
            max_attempts: 0,
            initial_delay_ms: 250,
            max_delay_ms: 1000,
            backoff_multiplier: 3.0,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_for(2), Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let start = Instant::now();

        let result: Result<&str, TestError> = policy
            .run("test", |_| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        let result: Result<(), TestError> = policy
            .run("test", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Transient)
            })
            .await;

        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_does_not_retry_fatal() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let start = Instant::now();

        let result: Result<(), TestError> = policy
            .run("test", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Fatal)
            })
            .await;

        assert!(matches!(result, Err(TestError::Fatal)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_honours_retry_after_hint() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1));
        let start = Instant::now();

        let result: Result<(), TestError> = policy
            .run("test", |attempt| async move {
                if attempt == 1 {
                    Err(TestError::Throttled(Duration::from_secs(30)))
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }
}
