//! AI summaries for report tickets.
//!
//! The [`BatchSummarizer`] turns each unique ticket of a run into a
//! [`SummaryOutcome`]: a generated summary, a placeholder when generation
//! failed, or `Skipped` when configuration excludes the ticket.

mod batch;
mod cache;
mod config;
mod excerpt;
mod llm;

pub use batch::{batch_sizes, BatchSummarizer, SummarizeError, SummaryOutcome, SummaryRun, SummaryStats};
pub use cache::{
    fingerprint, CacheError, CacheStats, CachedSummary, RunCache, SqliteSummaryCache, SummaryStore,
};
pub use config::{LlmProvider, SummarizerConfig, SummaryCacheConfig, CONTENT_PLACEHOLDER};
pub use excerpt::{build_excerpt, strip_markup, ExcerptLimits, TRUNCATION_MARKER};
pub use llm::{
    create_llm_client, CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage,
    OllamaClient, OpenAiCompatibleClient,
};
