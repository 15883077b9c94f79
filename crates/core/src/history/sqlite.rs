//! SQLite-backed report history.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{DailyTotals, HistoryError, ReportHistory, ReportRecord};
use crate::db;
use crate::report::{Report, ReportCounts};

/// Fixed-width UTC timestamps so text order is chronological.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// SQLite-backed report history.
pub struct SqliteReportHistory {
    conn: Mutex<Connection>,
}

impl SqliteReportHistory {
    /// Open (or create) the history database at `path`.
    pub fn new(path: &Path) -> Result<Self, HistoryError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory history (useful for testing).
    pub fn in_memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), HistoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                agent TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                total_new INTEGER NOT NULL DEFAULT 0,
                total_overdue INTEGER NOT NULL DEFAULT 0,
                total_expiring INTEGER NOT NULL DEFAULT 0,
                unique_tickets INTEGER NOT NULL DEFAULT 0,
                summaries_generated INTEGER NOT NULL DEFAULT 0,
                summaries_failed INTEGER NOT NULL DEFAULT 0,
                summaries_skipped INTEGER NOT NULL DEFAULT 0,
                delivered_via TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS report_tickets (
                report_id TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
                ticket_id TEXT NOT NULL,
                ticket_number TEXT NOT NULL,
                subject TEXT NOT NULL,
                client_name TEXT,
                urgency TEXT,
                section TEXT NOT NULL,
                days_overdue INTEGER NOT NULL DEFAULT 0,
                sla_due TEXT,
                summary TEXT,
                url TEXT,
                UNIQUE(report_id, ticket_id, section)
            );

            CREATE INDEX IF NOT EXISTS idx_reports_agent ON reports(agent, generated_at DESC);
            CREATE INDEX IF NOT EXISTS idx_report_tickets_report_id ON report_tickets(report_id);
            CREATE INDEX IF NOT EXISTS idx_report_tickets_ticket_id ON report_tickets(ticket_id);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, HistoryError> {
        self.conn
            .lock()
            .map_err(|_| HistoryError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ReportRecord> {
        let generated_at: String = row.get(2)?;
        Ok(ReportRecord {
            id: row.get(0)?,
            agent: row.get(1)?,
            generated_at: parse_ts(&generated_at),
            counts: ReportCounts {
                new: row.get::<_, i64>(3)? as usize,
                overdue: row.get::<_, i64>(4)? as usize,
                expiring: row.get::<_, i64>(5)? as usize,
                unique_tickets: row.get::<_, i64>(6)? as usize,
                summaries_generated: row.get::<_, i64>(7)? as usize,
                summaries_failed: row.get::<_, i64>(8)? as usize,
                summaries_skipped: row.get::<_, i64>(9)? as usize,
            },
            delivered_via: row.get(10)?,
            ticket_ids: BTreeSet::new(),
        })
    }

    fn load_ticket_ids(conn: &Connection, report_id: &str) -> Result<BTreeSet<String>, HistoryError> {
        let mut stmt =
            conn.prepare("SELECT DISTINCT ticket_id FROM report_tickets WHERE report_id = ?1")?;
        let ids = stmt
            .query_map(params![report_id], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }
}

const SELECT_REPORT: &str = "SELECT id, agent, generated_at, total_new, total_overdue, \
    total_expiring, unique_tickets, summaries_generated, summaries_failed, summaries_skipped, \
    delivered_via FROM reports";

impl ReportHistory for SqliteReportHistory {
    fn record(&self, report: &Report, delivered_via: &str) -> Result<(), HistoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO reports (id, agent, generated_at, total_new, total_overdue, total_expiring,
                unique_tickets, summaries_generated, summaries_failed, summaries_skipped, delivered_via)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                report.id,
                report.agent,
                format_ts(report.generated_at),
                report.counts.new as i64,
                report.counts.overdue as i64,
                report.counts.expiring as i64,
                report.counts.unique_tickets as i64,
                report.counts.summaries_generated as i64,
                report.counts.summaries_failed as i64,
                report.counts.summaries_skipped as i64,
                delivered_via,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO report_tickets (report_id, ticket_id, ticket_number, subject,
                    client_name, urgency, section, days_overdue, sla_due, summary, url)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )?;
            for section in &report.sections {
                for entry in &section.entries {
                    let t = &entry.ticket;
                    stmt.execute(params![
                        report.id,
                        t.id,
                        t.number,
                        t.subject,
                        t.client,
                        t.urgency.map(|u| u.as_str()),
                        section.category.as_str(),
                        entry.days_overdue,
                        t.sla_due.map(format_ts),
                        entry.summary.text(),
                        t.url,
                    ])?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn latest(&self, agent: &str) -> Result<Option<ReportRecord>, HistoryError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "{} WHERE agent = ?1 ORDER BY generated_at DESC, rowid DESC LIMIT 1",
                    SELECT_REPORT
                ),
                params![agent],
                Self::row_to_record,
            )
            .optional()?;

        match record {
            Some(mut record) => {
                record.ticket_ids = Self::load_ticket_ids(&conn, &record.id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn list(&self, agent: Option<&str>, limit: usize) -> Result<Vec<ReportRecord>, HistoryError> {
        let conn = self.conn()?;
        let mut records = match agent {
            Some(agent) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE agent = ?1 ORDER BY generated_at DESC, rowid DESC LIMIT ?2",
                    SELECT_REPORT
                ))?;
                let rows = stmt.query_map(params![agent, limit as i64], Self::row_to_record)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{} ORDER BY generated_at DESC, rowid DESC LIMIT ?1",
                    SELECT_REPORT
                ))?;
                let rows = stmt.query_map(params![limit as i64], Self::row_to_record)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        for record in &mut records {
            record.ticket_ids = Self::load_ticket_ids(&conn, &record.id)?;
        }
        Ok(records)
    }

    fn trends(&self, agent: &str, since: DateTime<Utc>) -> Result<Vec<DailyTotals>, HistoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT substr(generated_at, 1, 10) AS day,
                   COUNT(*),
                   SUM(total_new),
                   SUM(total_overdue),
                   SUM(total_expiring)
            FROM reports
            WHERE agent = ?1 AND generated_at >= ?2
            GROUP BY day
            ORDER BY day ASC
            "#,
        )?;
        let rows = stmt.query_map(params![agent, format_ts(since)], |row| {
            let day: String = row.get(0)?;
            Ok((
                day,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut totals = Vec::new();
        for row in rows {
            let (day, reports, new, overdue, expiring) = row?;
            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|e| HistoryError::Database(format!("bad date {}: {}", day, e)))?;
            totals.push(DailyTotals {
                date,
                reports: reports as u32,
                new: new as u32,
                overdue: overdue as u32,
                expiring: expiring as u32,
            });
        }
        Ok(totals)
    }
}
