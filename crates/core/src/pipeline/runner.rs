//! Digest runner implementation.
//!
//! One run for one agent:
//! load state -> three category queries -> dedup -> summarize -> assemble ->
//! deliver -> save state -> record history.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, error, info, warn};

use crate::config::{Config, NotifiedPolicy};
use crate::history::{ReportComparison, ReportHistory, SqliteReportHistory};
use crate::metrics;
use crate::notifier::{create_notifier, Notifier};
use crate::report::{assemble, Report};
use crate::source::{deduplicate, MovideskSource, QueryResult, TicketQuery, TicketSource};
use crate::state::{JsonStateStore, StateStore};
use crate::summarizer::{
    create_llm_client, BatchSummarizer, RunCache, SqliteSummaryCache, SummaryStore,
};
use crate::ticket::CategorizedTicket;

use super::types::{AgentFailure, BatchRunSummary, RunError, RunOutcome, RunSettings, RunStatus};

/// Runs the digest pipeline for one agent at a time.
pub struct DigestRunner {
    source: Arc<dyn TicketSource>,
    summarizer: BatchSummarizer,
    notifier: Arc<dyn Notifier>,
    state: Arc<dyn StateStore>,
    history: Option<Arc<dyn ReportHistory>>,
    settings: RunSettings,
}

impl DigestRunner {
    pub fn new(
        source: Arc<dyn TicketSource>,
        summarizer: BatchSummarizer,
        notifier: Arc<dyn Notifier>,
        state: Arc<dyn StateStore>,
        settings: RunSettings,
    ) -> Self {
        Self {
            source,
            summarizer,
            notifier,
            state,
            history: None,
            settings,
        }
    }

    /// Record every delivered report.
    pub fn with_history(mut self, history: Arc<dyn ReportHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Wire the production components: Movidesk source, configured LLM
    /// client and notifier, JSON state file and the SQLite database.
    pub fn from_config(config: &Config) -> Result<Self, RunError> {
        let setup = |what: &str, e: &dyn std::fmt::Display| {
            RunError::Setup(format!("{}: {}", what, e))
        };

        let source = MovideskSource::new(&config.helpdesk).map_err(|e| setup("ticket source", &e))?;
        let client =
            create_llm_client(&config.summarizer).map_err(|e| setup("summarizer", &e))?;

        let offset = FixedOffset::east_opt(config.run.display_utc_offset_hours * 3600)
            .ok_or_else(|| RunError::Setup("invalid display UTC offset".to_string()))?;
        let notifier = create_notifier(&config.notifier, offset).map_err(|e| setup("notifier", &e))?;

        let database_path = &config.storage.database_path;
        let needs_database = config.summarizer.cache.persistent || config.storage.history;
        if needs_database {
            ensure_parent_dir(database_path).map_err(|e| setup("database directory", &e))?;
        }

        let mut summarizer = BatchSummarizer::new(client, config.summarizer.clone());
        if config.summarizer.enabled && config.summarizer.cache.persistent {
            let ttl = chrono::Duration::days(config.summarizer.cache.ttl_days);
            let cache = SqliteSummaryCache::new(database_path, ttl)
                .map_err(|e| setup("summary cache", &e))?;
            match cache.purge_older_than(Utc::now() - ttl) {
                Ok(0) => {}
                Ok(purged) => info!(purged, "Purged expired cached summaries"),
                Err(e) => warn!(error = %e, "Failed to purge summary cache"),
            }
            summarizer = summarizer.with_store(Arc::new(cache));
        }

        let mut runner = Self::new(
            Arc::new(source),
            summarizer,
            notifier,
            Arc::new(JsonStateStore::new(config.storage.state_path.clone())),
            RunSettings::from_config(config),
        );

        if config.storage.history {
            let history =
                SqliteReportHistory::new(database_path).map_err(|e| setup("report history", &e))?;
            runner = runner.with_history(Arc::new(history));
        }

        Ok(runner)
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Run every agent once, in order. A failing agent does not stop the
    /// others.
    pub async fn run_all(&self, agents: &[String]) -> BatchRunSummary {
        let mut summary = BatchRunSummary::default();
        for agent in agents {
            match self.run(agent).await {
                Ok(outcome) => summary.outcomes.push(outcome),
                Err(error) => summary.failures.push(AgentFailure {
                    agent: agent.clone(),
                    error,
                }),
            }
        }
        info!(
            agents = summary.total(),
            succeeded = summary.succeeded(),
            partial = summary.partial(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Digest batch finished"
        );
        summary
    }

    /// Run the pipeline for one agent at the current time.
    pub async fn run(&self, agent: &str) -> Result<RunOutcome, RunError> {
        self.run_at(agent, Utc::now()).await
    }

    /// Run the pipeline for one agent, evaluating categories at `now`.
    pub async fn run_at(&self, agent: &str, now: DateTime<Utc>) -> Result<RunOutcome, RunError> {
        let started = Instant::now();
        let result = self.execute(agent, now).await;

        let label = match &result {
            Ok(outcome) => outcome.status.as_str(),
            Err(_) => "failed",
        };
        metrics::DIGEST_RUNS.with_label_values(&[label]).inc();
        metrics::RUN_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => info!(
                agent,
                status = outcome.status.as_str(),
                tickets = outcome.report.counts.unique_tickets,
                placeholders = outcome.report.counts.summaries_failed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Digest run finished"
            ),
            Err(e) => error!(agent, stage = e.stage(), error = %e, "Digest run failed"),
        }
        result
    }

    async fn execute(&self, agent: &str, now: DateTime<Utc>) -> Result<RunOutcome, RunError> {
        let started_at = Utc::now();
        let mut state = self.state.load(agent)?;
        debug!(
            agent,
            last_poll_time = ?state.last_poll_time,
            notified = state.notified_ticket_ids.len(),
            "Loaded poll state"
        );

        let tickets = self.fetch(agent, now).await?;
        let tickets = self.apply_notified_policy(agent, tickets, &state.notified_ticket_ids);

        let mut cache = RunCache::new();
        let summary = self.summarizer.summarize(&tickets, &mut cache, now).await?;
        let report = assemble(agent, now, &tickets, &summary.outcomes, now);

        if report.is_empty() && !self.settings.send_empty {
            info!(agent, "No tickets need attention, skipping delivery");
            return Ok(RunOutcome {
                agent: agent.to_string(),
                status: RunStatus::Skipped,
                report,
                summary_stats: summary.stats,
                delivered_via: None,
                comparison: None,
                started_at,
                finished_at: Utc::now(),
            });
        }

        self.notifier.deliver(&report).await?;
        metrics::REPORTS_DELIVERED.inc();
        info!(agent, report_id = %report.id, notifier = self.notifier.name(), "Report delivered");

        state.record_delivery(now, report.ticket_ids(), self.settings.notified_keep);
        if let Err(e) = self.state.save(agent, &state) {
            error!(agent, error = %e, "Report was delivered but poll state could not be saved");
            return Err(e.into());
        }

        let comparison = self.record_history(&report);
        let status = if report.has_placeholders() {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        };

        Ok(RunOutcome {
            agent: agent.to_string(),
            status,
            report,
            summary_stats: summary.stats,
            delivered_via: Some(self.notifier.name().to_string()),
            comparison,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Issue the three category queries sequentially and merge the results.
    async fn fetch(&self, agent: &str, now: DateTime<Utc>) -> Result<Vec<CategorizedTicket>, RunError> {
        let queries =
            TicketQuery::for_run(agent, self.settings.max_results, now, self.settings.windows);
        let mut results = Vec::with_capacity(queries.len());

        for query in queries {
            let tickets = self.source.fetch(&query).await.map_err(|e| {
                warn!(agent, category = %query.category, error = %e, "Ticket query failed");
                e
            })?;
            debug!(agent, category = %query.category, count = tickets.len(), "Fetched tickets");
            metrics::TICKETS_FETCHED
                .with_label_values(&[query.category.as_str()])
                .inc_by(tickets.len() as u64);
            results.push(QueryResult::new(query.category, tickets));
        }

        let tickets = deduplicate(results);
        info!(agent, unique = tickets.len(), source = self.source.name(), "Tickets fetched");
        Ok(tickets)
    }

    fn apply_notified_policy(
        &self,
        agent: &str,
        tickets: Vec<CategorizedTicket>,
        notified: &[String],
    ) -> Vec<CategorizedTicket> {
        if self.settings.notified_policy == NotifiedPolicy::Include || notified.is_empty() {
            return tickets;
        }
        let before = tickets.len();
        let kept: Vec<CategorizedTicket> = tickets
            .into_iter()
            .filter(|t| !notified.iter().any(|id| id == t.id()))
            .collect();
        if kept.len() < before {
            debug!(agent, excluded = before - kept.len(), "Dropped already notified tickets");
        }
        kept
    }

    /// Store the report and compare it with the previous one. History
    /// failures never fail a delivered run.
    fn record_history(&self, report: &Report) -> Option<ReportComparison> {
        let history = self.history.as_ref()?;

        let comparison = match history.latest(&report.agent) {
            Ok(Some(previous)) => Some(ReportComparison::between(&previous, report)),
            Ok(None) => None,
            Err(e) => {
                warn!(agent = %report.agent, error = %e, "Failed to read report history");
                None
            }
        };
        if let Some(diff) = &comparison {
            info!(
                agent = %report.agent,
                diff_new = diff.diff_new,
                diff_overdue = diff.diff_overdue,
                diff_expiring = diff.diff_expiring,
                appeared = diff.appeared.len(),
                cleared = diff.cleared.len(),
                "Compared with previous report"
            );
        }

        if let Err(e) = history.record(report, self.notifier.name()) {
            warn!(agent = %report.agent, error = %e, "Failed to record report history");
        }
        comparison
    }
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}
