//! Sliding-window rate limiter for outbound API quotas.
//!
//! Both the helpdesk API and the summarization API publish limits of the form
//! "N requests per window". A caller that hits the limit is suspended until the
//! oldest request in the window expires; it never fails for quota reasons.

use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::metrics;

/// Rate limit status for a limiter.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub window_secs: u64,
    pub used: u32,
    pub next_available_in_ms: Option<u64>,
}

/// Request log over a sliding window.
pub struct SlidingWindow {
    /// Max requests inside one window.
    limit: u32,
    window: Duration,
    /// Grant times, oldest first.
    grants: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(limit: u32, window: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            window,
            grants: VecDeque::with_capacity(limit as usize),
        }
    }

    /// Try to record a request now.
    ///
    /// Returns `Ok(())` if the request fits in the window.
    /// Returns `Err(wait_duration)` with the time until a slot frees up.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        self.prune(now);

        if (self.grants.len() as u32) < self.limit {
            self.grants.push_back(now);
            Ok(())
        } else {
            Err(self.wait_time(now))
        }
    }

    pub fn status(&mut self) -> RateLimitStatus {
        let now = Instant::now();
        self.prune(now);
        let used = self.grants.len() as u32;
        RateLimitStatus {
            limit: self.limit,
            window_secs: self.window.as_secs(),
            used,
            next_available_in_ms: if used < self.limit {
                None
            } else {
                Some(self.wait_time(now).as_millis() as u64)
            },
        }
    }

    fn wait_time(&self, now: Instant) -> Duration {
        self.grants
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.grants.front() {
            if now.duration_since(*oldest) >= self.window {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Async rate limiter shared by the calls of one client.
pub struct RateLimiter {
    name: String,
    window: Mutex<SlidingWindow>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, limit: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            window: Mutex::new(SlidingWindow::new(limit, window)),
        }
    }

    pub fn per_minute(name: impl Into<String>, requests_per_minute: u32) -> Self {
        Self::new(name, requests_per_minute, Duration::from_secs(60))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until a request slot is available and take it.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.window.lock().await.try_acquire() {
                Ok(()) => return,
                Err(wait) => wait,
            };
            debug!(
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, waiting for quota"
            );
            metrics::RATE_LIMIT_WAITS
                .with_label_values(&[self.name.as_str()])
                .inc();
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn status(&self) -> RateLimitStatus {
        self.window.lock().await.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_window_allows_up_to_limit() {
        let mut window = SlidingWindow::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(window.try_acquire().is_ok());
        }
        let wait = window.try_acquire().unwrap_err();
        assert_eq!(wait, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_frees_slot_when_oldest_expires() {
        let mut window = SlidingWindow::new(2, Duration::from_secs(10));
        window.try_acquire().unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        window.try_acquire().unwrap();

        // Oldest grant expires 6s from now.
        assert_eq!(window.try_acquire().unwrap_err(), Duration::from_secs(6));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(window.try_acquire().is_ok());
        // The second grant is still inside the window.
        assert_eq!(window.try_acquire().unwrap_err(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_status() {
        let mut window = SlidingWindow::new(2, Duration::from_secs(60));
        let status = window.status();
        assert_eq!(status.used, 0);
        assert!(status.next_available_in_ms.is_none());

        window.try_acquire().unwrap();
        window.try_acquire().unwrap();
        let status = window.status();
        assert_eq!(status.used, 2);
        assert_eq!(status.next_available_in_ms, Some(60_000));
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let window = SlidingWindow::new(0, Duration::from_secs(1));
        assert_eq!(window.limit, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_suspends_until_window_opens() {
        let limiter = RateLimiter::new("test", 10, Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        // The 11th request waits for the first one to leave the window.
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_is_shared_between_tasks() {
        let limiter = Arc::new(RateLimiter::per_minute("shared", 2));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap().duration_since(start));
        }
        finished.sort();
        assert_eq!(
            finished,
            vec![
                Duration::ZERO,
                Duration::ZERO,
                Duration::from_secs(60),
                Duration::from_secs(60)
            ]
        );
    }
}
