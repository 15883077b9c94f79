//! In-memory state store.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{PollState, StateError, StateStore};

/// Volatile state store, for tests and one-shot dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<String, PollState>>,
    /// Number of successful saves.
    saves: RwLock<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the state of an agent.
    pub fn with_state(self, agent: &str, state: PollState) -> Self {
        if let Ok(mut states) = self.states.write() {
            states.insert(agent.to_string(), state);
        }
        self
    }

    pub fn save_count(&self) -> usize {
        self.saves.read().map(|s| *s).unwrap_or(0)
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, agent: &str) -> Result<PollState, StateError> {
        let states = self.states.read().map_err(|_| StateError::Poisoned)?;
        Ok(states.get(agent).cloned().unwrap_or_default())
    }

    fn save(&self, agent: &str, state: &PollState) -> Result<(), StateError> {
        self.states
            .write()
            .map_err(|_| StateError::Poisoned)?
            .insert(agent.to_string(), state.clone());
        *self.saves.write().map_err(|_| StateError::Poisoned)? += 1;
        Ok(())
    }
}
