//! JSON file state store.
//!
//! File layout:
//!
//! ```json
//! {
//!   "agents": {
//!     "agent@example.com": { "last_poll_time": "...", "notified_ticket_ids": ["1", "2"] }
//!   },
//!   "saved_at": "2025-03-10T12:00:00+00:00",
//!   "version": "2.0"
//! }
//! ```
//!
//! Files in the older single-agent layout (`last_poll_time` and
//! `notified_ticket_ids` at the top level) are adopted by the first agent that
//! loads them and rewritten in the multi-agent layout right away.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{PollState, StateError, StateStore};

const FORMAT_VERSION: &str = "2.0";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    agents: BTreeMap<String, PollState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    version: String,
}

/// What was found on disk.
#[derive(Debug, Default)]
struct Loaded {
    file: StateFile,
    /// Single-agent state waiting for an owner.
    legacy: Option<PollState>,
}

/// State store backed by one JSON file shared by all agents.
pub struct JsonStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Loaded, StateError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No state file, starting fresh");
            return Ok(Loaded::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Loaded::default());
        }
        let value: Value =
            serde_json::from_str(&raw).map_err(|e| StateError::Corrupt(e.to_string()))?;

        if value.get("agents").is_some() {
            let file: StateFile =
                serde_json::from_value(value).map_err(|e| StateError::Corrupt(e.to_string()))?;
            return Ok(Loaded { file, legacy: None });
        }

        let legacy: PollState =
            serde_json::from_value(value).map_err(|e| StateError::Corrupt(e.to_string()))?;
        Ok(Loaded {
            file: StateFile::default(),
            legacy: Some(legacy),
        })
    }

    /// Write through a temporary file so a crash never leaves a torn file.
    fn write(&self, file: &StateFile) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json =
            serde_json::to_string_pretty(file).map_err(|e| StateError::Corrupt(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    fn load(&self, agent: &str) -> Result<PollState, StateError> {
        let _guard = self.lock.lock().map_err(|_| StateError::Poisoned)?;
        let mut loaded = self.read()?;

        if let Some(state) = loaded.file.agents.get(agent) {
            return Ok(state.clone());
        }
        if let Some(legacy) = loaded.legacy {
            info!(agent, "Adopting single-agent state file, migrating to multi-agent format");
            loaded.file.agents.insert(agent.to_string(), legacy.clone());
            loaded.file.saved_at = Some(Utc::now());
            loaded.file.version = FORMAT_VERSION.to_string();
            self.write(&loaded.file)?;
            return Ok(legacy);
        }
        Ok(PollState::default())
    }

    fn save(&self, agent: &str, state: &PollState) -> Result<(), StateError> {
        let _guard = self.lock.lock().map_err(|_| StateError::Poisoned)?;
        let mut loaded = self.read()?;

        if let Some(legacy) = loaded.legacy.take() {
            // Never loaded by anyone: the saving agent owns it from now on.
            info!(agent, "Migrating single-agent state file to multi-agent format");
            loaded.file.agents.entry(agent.to_string()).or_insert(legacy);
        }
        loaded.file.agents.insert(agent.to_string(), state.clone());
        loaded.file.saved_at = Some(Utc::now());
        loaded.file.version = FORMAT_VERSION.to_string();

        self.write(&loaded.file)?;
        debug!(agent, path = %self.path.display(), "State saved");
        Ok(())
    }
}
