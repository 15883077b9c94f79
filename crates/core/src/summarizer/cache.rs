//! Summary caches.
//!
//! [`RunCache`] lives for one run and guarantees at most one summarization per
//! ticket id. [`SummaryStore`] is the optional persistent layer behind it,
//! keyed by ticket id and invalidated when the prepared content changes or the
//! entry ages past its TTL.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::db;

/// Errors from the persistent summary cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        CacheError::Database(e.to_string())
    }
}

/// Per-run summary cache keyed by ticket id.
#[derive(Debug, Default)]
pub struct RunCache {
    entries: HashMap<String, String>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ticket_id: &str) -> Option<&str> {
        self.entries.get(ticket_id).map(String::as_str)
    }

    pub fn insert(&mut self, ticket_id: impl Into<String>, summary: impl Into<String>) {
        self.entries.insert(ticket_id.into(), summary.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hash identifying the exact input a summary was generated from.
pub fn fingerprint(model: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A summary ready to be persisted.
#[derive(Debug, Clone)]
pub struct CachedSummary {
    pub ticket_id: String,
    pub ticket_number: String,
    pub fingerprint: String,
    pub summary: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

/// Aggregate numbers about the persistent cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    /// Sum of cache hits over all entries.
    pub total_uses: u64,
    /// Entries served at least once after being generated.
    pub reused_entries: u64,
}

/// Persistent summary cache.
///
/// Implementations must be thread-safe. Methods are synchronous; SQLite calls
/// are short and the summarizer does not hold them across awaits.
pub trait SummaryStore: Send + Sync {
    /// Fresh summary for `ticket_id` generated from the same fingerprint, if any.
    /// A hit bumps the entry's use count.
    fn get(
        &self,
        ticket_id: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, CacheError>;

    /// Insert or replace the entry for a ticket.
    fn put(&self, entry: &CachedSummary) -> Result<(), CacheError>;

    /// Remove entries generated before `cutoff`. Returns the number removed.
    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CacheError>;

    fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// SQLite-backed summary cache.
pub struct SqliteSummaryCache {
    conn: Mutex<Connection>,
    ttl: Duration,
}

impl SqliteSummaryCache {
    /// Open (or create) the cache database at `path`.
    pub fn new(path: &Path, ttl: Duration) -> Result<Self, CacheError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl,
        })
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory(ttl: Duration) -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS ai_summaries (
                ticket_id TEXT PRIMARY KEY,
                ticket_number TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                summary TEXT NOT NULL,
                model TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                last_used_at TEXT,
                use_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_ai_summaries_generated_at ON ai_summaries(generated_at);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Database("connection lock poisoned".to_string()))
    }
}

impl SummaryStore for SqliteSummaryCache {
    fn get(
        &self,
        ticket_id: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, CacheError> {
        let conn = self.conn()?;

        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT fingerprint, summary, generated_at FROM ai_summaries WHERE ticket_id = ?1",
                params![ticket_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((stored_fingerprint, summary, generated_at)) = row else {
            return Ok(None);
        };
        if stored_fingerprint != fingerprint {
            return Ok(None);
        }
        let fresh = DateTime::parse_from_rfc3339(&generated_at)
            .map(|dt| dt.with_timezone(&Utc) > now - self.ttl)
            .unwrap_or(false);
        if !fresh {
            return Ok(None);
        }

        conn.execute(
            "UPDATE ai_summaries SET use_count = use_count + 1, last_used_at = ?1 WHERE ticket_id = ?2",
            params![now.to_rfc3339(), ticket_id],
        )?;

        Ok(Some(summary))
    }

    fn put(&self, entry: &CachedSummary) -> Result<(), CacheError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO ai_summaries
                (ticket_id, ticket_number, fingerprint, summary, model, generated_at, last_used_at, use_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 0)
            ON CONFLICT(ticket_id) DO UPDATE SET
                ticket_number = excluded.ticket_number,
                fingerprint = excluded.fingerprint,
                summary = excluded.summary,
                model = excluded.model,
                generated_at = excluded.generated_at,
                last_used_at = NULL,
                use_count = 0
            "#,
            params![
                entry.ticket_id,
                entry.ticket_number,
                entry.fingerprint,
                entry.summary,
                entry.model,
                entry.generated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        // RFC 3339 strings in UTC compare chronologically.
        let removed = conn.execute(
            "DELETE FROM ai_summaries WHERE generated_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let conn = self.conn()?;
        let stats = conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(use_count), 0),
                   COALESCE(SUM(CASE WHEN use_count > 0 THEN 1 ELSE 0 END), 0)
            FROM ai_summaries
            "#,
            [],
            |row| {
                Ok(CacheStats {
                    entries: row.get::<_, i64>(0)? as u64,
                    total_uses: row.get::<_, i64>(1)? as u64,
                    reused_entries: row.get::<_, i64>(2)? as u64,
                })
            },
        )?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn entry(id: &str, fingerprint: &str, generated_at: DateTime<Utc>) -> CachedSummary {
        CachedSummary {
            ticket_id: id.to_string(),
            ticket_number: format!("#{}", id),
            fingerprint: fingerprint.to_string(),
            summary: format!("summary of {}", id),
            model: "test-model".to_string(),
            generated_at,
        }
    }

    #[test]
    fn test_run_cache() {
        let mut cache = RunCache::new();
        assert!(cache.is_empty());
        cache.insert("1", "first");
        cache.insert("1", "second");
        assert_eq!(cache.get("1"), Some("second"));
        assert_eq!(cache.get("2"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_fingerprint_depends_on_model_and_prompt() {
        let a = fingerprint("m1", "prompt");
        assert_eq!(a, fingerprint("m1", "prompt"));
        assert_ne!(a, fingerprint("m2", "prompt"));
        assert_ne!(a, fingerprint("m1", "prompt!"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hit_requires_matching_fingerprint() {
        let cache = SqliteSummaryCache::in_memory(Duration::days(7)).unwrap();
        let now = fixtures::now();
        cache.put(&entry("1", "abc", now - Duration::hours(1))).unwrap();

        assert_eq!(
            cache.get("1", "abc", now).unwrap(),
            Some("summary of 1".to_string())
        );
        assert_eq!(cache.get("1", "changed", now).unwrap(), None);
        assert_eq!(cache.get("2", "abc", now).unwrap(), None);
    }

    #[test]
    fn test_expired_entries_miss() {
        let cache = SqliteSummaryCache::in_memory(Duration::days(7)).unwrap();
        let now = fixtures::now();
        cache.put(&entry("old", "f", now - Duration::days(8))).unwrap();
        cache.put(&entry("recent", "f", now - Duration::days(6))).unwrap();

        assert_eq!(cache.get("old", "f", now).unwrap(), None);
        assert!(cache.get("recent", "f", now).unwrap().is_some());
    }

    #[test]
    fn test_stats_and_purge() {
        let cache = SqliteSummaryCache::in_memory(Duration::days(7)).unwrap();
        let now = fixtures::now();
        cache.put(&entry("1", "f", now - Duration::days(10))).unwrap();
        cache.put(&entry("2", "f", now)).unwrap();
        cache.put(&entry("3", "f", now)).unwrap();
        cache.get("2", "f", now).unwrap();
        cache.get("2", "f", now).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(
            stats,
            CacheStats {
                entries: 3,
                total_uses: 2,
                reused_entries: 1
            }
        );

        assert_eq!(cache.purge_older_than(now - Duration::days(7)).unwrap(), 1);
        assert_eq!(cache.stats().unwrap().entries, 2);
    }

    #[test]
    fn test_put_replaces_and_resets_use_count() {
        let cache = SqliteSummaryCache::in_memory(Duration::days(7)).unwrap();
        let now = fixtures::now();
        cache.put(&entry("1", "old", now)).unwrap();
        cache.get("1", "old", now).unwrap();

        let mut updated = entry("1", "new", now);
        updated.summary = "fresh".to_string();
        cache.put(&updated).unwrap();

        assert_eq!(cache.get("1", "new", now).unwrap(), Some("fresh".to_string()));
        assert_eq!(cache.stats().unwrap().total_uses, 1);
    }

    #[test]
    fn test_file_backed_cache_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("digest.db");
        let now = fixtures::now();
        {
            let cache = SqliteSummaryCache::new(&path, Duration::days(7)).unwrap();
            cache.put(&entry("9", "f", now)).unwrap();
        }
        let cache = SqliteSummaryCache::new(&path, Duration::days(7)).unwrap();
        assert!(cache.get("9", "f", now).unwrap().is_some());
    }
}
