//! Shared SQLite connection setup.
//!
//! The summary cache and the report history live in the same database file,
//! and the server opens its own read handle on the history. Every handle
//! waits for locks instead of failing with `SQLITE_BUSY`.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

/// How long a statement waits for another connection's lock.
pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a file-backed database for use alongside other connections.
pub(crate) fn open(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // Readers do not block the writer.
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_sets_busy_timeout_and_wal() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open(&dir.path().join("digest.db")).unwrap();

        let timeout: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();

        assert_eq!(timeout, 5000);
        assert_eq!(mode, "wal");
    }
}
