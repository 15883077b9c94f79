//! Poll state persisted between runs.
//!
//! Each agent has a [`PollState`]: when its last run delivered a report and
//! which ticket ids have already been notified. The pipeline loads it before
//! fetching and saves it only after the notifier accepted the report.

mod json;
mod memory;

pub use json::JsonStateStore;
pub use memory::MemoryStateStore;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Errors from a state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is corrupt: {0}")]
    Corrupt(String),

    #[error("State store lock poisoned")]
    Poisoned,
}

/// Dedup state for one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollState {
    #[serde(default, deserialize_with = "deserialize_lenient_time")]
    pub last_poll_time: Option<DateTime<Utc>>,
    /// Notified ids, oldest first.
    #[serde(default)]
    pub notified_ticket_ids: Vec<String>,
}

impl PollState {
    pub fn contains(&self, ticket_id: &str) -> bool {
        self.notified_ticket_ids.iter().any(|id| id == ticket_id)
    }

    /// Record a delivered report: stamp the poll time and remember the ids,
    /// keeping only the `keep` most recent.
    pub fn record_delivery<I>(&mut self, delivered_at: DateTime<Utc>, ticket_ids: I, keep: usize)
    where
        I: IntoIterator<Item = String>,
    {
        self.last_poll_time = Some(delivered_at);

        let mut known: HashSet<String> = self.notified_ticket_ids.iter().cloned().collect();
        for id in ticket_ids {
            if known.insert(id.clone()) {
                self.notified_ticket_ids.push(id);
            }
        }
        if self.notified_ticket_ids.len() > keep {
            let excess = self.notified_ticket_ids.len() - keep;
            self.notified_ticket_ids.drain(..excess);
        }
    }
}

/// Storage for per-agent poll state.
///
/// Implementations must be thread-safe. Loading an agent that was never saved
/// yields the default (empty) state.
pub trait StateStore: Send + Sync {
    fn load(&self, agent: &str) -> Result<PollState, StateError>;

    fn save(&self, agent: &str, state: &PollState) -> Result<(), StateError>;
}

/// Accepts RFC 3339 and naive ISO timestamps (taken as UTC).
fn deserialize_lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}
