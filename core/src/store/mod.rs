//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Jobs call store methods; they never execute SQL directly.

use crate::error::ScoringResult;
mod outputs;
mod pending;
mod run_log;
use rusqlite::Connection;

pub struct ScoringStore {
    conn: Connection,
}

impl ScoringStore {
    pub fn open(path: &str) -> ScoringResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ScoringResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_scoring_run.sql"))?;
        Ok(())
    }
}

/// Quote an SQL identifier taken from configuration.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ── Row types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringRunRow {
    pub run_id: String,
    pub pipeline: String,
    pub source_table: String,
    pub started_at: String,
    pub finished_at: String,
    pub rows_scored: i64,
    pub rows_skipped: i64,
    pub positives: i64,
    pub threshold: f64,
    pub past_due: bool,
}

/// What a reconcile wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub rows_updated: usize,
    /// Keys that matched more than one source row. Every matching row got
    /// the prediction of the last record carrying that key.
    pub ambiguous_keys: usize,
}

/// Aggregate view of one scored table.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PredictionSummary {
    pub pipeline: String,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub pending_rows: i64,
    pub predicted_positive: i64,
    /// Percentage of processed rows with verdict 1.
    pub positive_rate: f64,
}
