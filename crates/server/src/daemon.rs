//! Scheduled digest runs.
//!
//! The daemon runs every configured agent, records the outcomes in the app
//! state, then sleeps for the interval the business-hours schedule gives for
//! the current time. Batches never overlap.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use digest_core::{BatchRunSummary, DigestRunner, PollSchedule};

use crate::metrics::{DAEMON_BUSINESS_HOURS, DAEMON_NEXT_RUN_SECONDS};
use crate::state::AppState;

pub struct Daemon {
    runner: Arc<DigestRunner>,
    state: Arc<AppState>,
    schedule: PollSchedule,
    agents: Vec<String>,
}

impl Daemon {
    pub fn new(
        runner: Arc<DigestRunner>,
        state: Arc<AppState>,
        schedule: PollSchedule,
        agents: Vec<String>,
    ) -> Self {
        Self {
            runner,
            state,
            schedule,
            agents,
        }
    }

    /// Loop until `shutdown` flips. A batch in flight when shutdown is
    /// requested is dropped: nothing further is delivered and its state is
    /// not saved.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.agents.is_empty() {
            warn!("Daemon started without agents, nothing will be reported");
        }
        info!(agents = self.agents.len(), "Digest daemon started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let summary = tokio::select! {
                summary = self.runner.run_all(&self.agents) => summary,
                _ = shutdown.changed() => {
                    warn!("Shutdown requested during a run, abandoning it");
                    break;
                }
            };
            self.state.record_batch(&summary).await;

            let now = Utc::now();
            let business = self.schedule.is_business_hours(now);
            let interval = self.schedule.interval_at(now);
            DAEMON_BUSINESS_HOURS.set(business as i64);
            DAEMON_NEXT_RUN_SECONDS.set(interval.as_secs() as i64);
            info!(
                business_hours = business,
                next_run_secs = interval.as_secs(),
                failed = summary.failed(),
                "Next digest batch scheduled"
            );

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("Digest daemon stopped");
    }
}

/// Run every agent once, unless `shutdown` resolves first.
pub async fn run_once<F>(runner: &DigestRunner, agents: &[String], shutdown: F) -> Option<BatchRunSummary>
where
    F: std::future::Future<Output = ()>,
{
    tokio::select! {
        summary = runner.run_all(agents) => Some(summary),
        _ = shutdown => {
            warn!("Interrupted, no report was sent for the remaining agents");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use digest_core::state::MemoryStateStore;
    use digest_core::summarizer::SummarizerConfig;
    use digest_core::testing::{fixtures, MockLlmClient, MockNotifier, MockTicketSource};
    use digest_core::{load_config_from_str, BatchSummarizer, RunSettings, TicketCategory};

    fn config() -> digest_core::Config {
        load_config_from_str(
            r#"
[helpdesk]
api_token = "t"

[run]
agents = ["a@x.com"]
"#,
        )
        .unwrap()
    }

    fn runner(notifier: Arc<MockNotifier>) -> Arc<DigestRunner> {
        Arc::new(DigestRunner::new(
            Arc::new(MockTicketSource::new()),
            BatchSummarizer::new(Arc::new(MockLlmClient::new()), SummarizerConfig::default()),
            notifier,
            Arc::new(MemoryStateStore::new()),
            RunSettings::default(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_repeats_until_shutdown() {
        let config = config();
        let notifier = Arc::new(MockNotifier::new());
        let state = Arc::new(AppState::new(config.clone()));
        let schedule = PollSchedule::from_config(&config).unwrap();
        let daemon = Daemon::new(
            runner(notifier.clone()),
            state.clone(),
            schedule,
            config.run.agents.clone(),
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(daemon.run(rx));

        // Longer than the longest interval.
        tokio::time::sleep(Duration::from_secs(7 * 60)).await;
        assert!(notifier.delivery_count().await >= 2);
        assert_eq!(state.agent_status("a@x.com").await.unwrap().status, "success");

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_once_completes() {
        let notifier = Arc::new(MockNotifier::new());
        let runner = runner(notifier.clone());

        let summary = run_once(&runner, &["a@x.com".to_string()], std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary.total(), 1);
        assert_eq!(notifier.delivery_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_interrupted_delivers_nothing() {
        let source = Arc::new(MockTicketSource::new());
        source
            .set_results(TicketCategory::New, vec![fixtures::new_ticket("1", 1)])
            .await;
        let llm = Arc::new(MockLlmClient::new());
        llm.set_delay(Duration::from_secs(30)).await;
        let notifier = Arc::new(MockNotifier::new());
        let state = Arc::new(MemoryStateStore::new());
        let runner = DigestRunner::new(
            source,
            BatchSummarizer::new(llm, SummarizerConfig::default()),
            notifier.clone(),
            state.clone(),
            RunSettings::default(),
        );

        let summary = run_once(
            &runner,
            &["a@x.com".to_string()],
            tokio::time::sleep(Duration::from_secs(1)),
        )
        .await;

        assert!(summary.is_none());
        assert_eq!(notifier.delivery_count().await, 0);
        assert_eq!(state.save_count(), 0);
    }
}
