use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use digest_core::{BatchRunSummary, Config, ReportHistory, RunOutcome, SanitizedConfig};

use crate::metrics::AGENT_LAST_SUCCESS;

/// Last known outcome for one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent: String,
    /// `success`, `partial_failure`, `skipped` or `failed`.
    pub status: String,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    pub tickets: usize,
    pub placeholders: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentStatus {
    fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            agent: outcome.agent.clone(),
            status: outcome.status.as_str().to_string(),
            finished_at: outcome.finished_at,
            report_id: outcome
                .delivered_via
                .as_ref()
                .map(|_| outcome.report.id.clone()),
            tickets: outcome.report.counts.unique_tickets,
            placeholders: outcome.report.counts.summaries_failed,
            stage: None,
            error: None,
        }
    }
}

/// Shared application state
pub struct AppState {
    config: Config,
    history: Option<Arc<dyn ReportHistory>>,
    started_at: DateTime<Utc>,
    agents: RwLock<BTreeMap<String, AgentStatus>>,
    last_batch_at: RwLock<Option<DateTime<Utc>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            history: None,
            started_at: Utc::now(),
            agents: RwLock::new(BTreeMap::new()),
            last_batch_at: RwLock::new(None),
        }
    }

    /// Serve delivered reports from this history.
    pub fn with_history(mut self, history: Arc<dyn ReportHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn history(&self) -> Option<&Arc<dyn ReportHistory>> {
        self.history.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Remember the outcome of every agent in a finished batch.
    pub async fn record_batch(&self, summary: &BatchRunSummary) {
        let now = Utc::now();
        let mut agents = self.agents.write().await;

        for outcome in &summary.outcomes {
            if outcome.delivered_via.is_some() {
                AGENT_LAST_SUCCESS
                    .with_label_values(&[&outcome.agent])
                    .set(outcome.finished_at.timestamp());
            }
            agents.insert(outcome.agent.clone(), AgentStatus::from_outcome(outcome));
        }
        for failure in &summary.failures {
            agents.insert(
                failure.agent.clone(),
                AgentStatus {
                    agent: failure.agent.clone(),
                    status: "failed".to_string(),
                    finished_at: now,
                    report_id: None,
                    tickets: 0,
                    placeholders: 0,
                    stage: Some(failure.error.stage().to_string()),
                    error: Some(failure.error.to_string()),
                },
            );
        }

        *self.last_batch_at.write().await = Some(now);
    }

    pub async fn agent_statuses(&self) -> Vec<AgentStatus> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn agent_status(&self, agent: &str) -> Option<AgentStatus> {
        self.agents.read().await.get(agent).cloned()
    }

    pub async fn last_batch_at(&self) -> Option<DateTime<Utc>> {
        *self.last_batch_at.read().await
    }
}
