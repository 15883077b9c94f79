//! Digest pipeline.
//!
//! Runs are sequential: one agent at a time, three queries one after the
//! other. Parallelism only exists inside a summarization batch.

mod runner;
mod types;

pub use runner::DigestRunner;
pub use types::{AgentFailure, BatchRunSummary, RunError, RunOutcome, RunSettings, RunStatus};
