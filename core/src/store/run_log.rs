use super::{ScoringRunRow, ScoringStore};
use crate::error::ScoringResult;
use rusqlite::{params, Connection};

pub(super) fn insert_run(conn: &Connection, run: &ScoringRunRow) -> ScoringResult<()> {
    conn.execute(
        "INSERT INTO scoring_run (
            run_id, pipeline, source_table, started_at, finished_at,
            rows_scored, rows_skipped, positives, threshold, past_due
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            run.run_id,
            run.pipeline,
            run.source_table,
            run.started_at,
            run.finished_at,
            run.rows_scored,
            run.rows_skipped,
            run.positives,
            run.threshold,
            run.past_due,
        ],
    )?;
    Ok(())
}

impl ScoringStore {
    pub fn run_count(&self, pipeline: &str) -> ScoringResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM scoring_run WHERE pipeline = ?1",
                params![pipeline],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn recent_runs(&self, pipeline: &str, limit: usize) -> ScoringResult<Vec<ScoringRunRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, pipeline, source_table, started_at, finished_at,
                    rows_scored, rows_skipped, positives, threshold, past_due
             FROM scoring_run
             WHERE pipeline = ?1
             ORDER BY finished_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![pipeline, limit as i64], |row| {
                Ok(ScoringRunRow {
                    run_id: row.get(0)?,
                    pipeline: row.get(1)?,
                    source_table: row.get(2)?,
                    started_at: row.get(3)?,
                    finished_at: row.get(4)?,
                    rows_scored: row.get(5)?,
                    rows_skipped: row.get(6)?,
                    positives: row.get(7)?,
                    threshold: row.get(8)?,
                    past_due: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
