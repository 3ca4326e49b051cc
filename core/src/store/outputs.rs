use super::{quote_ident, PredictionSummary, ScoringStore};
use crate::{config::PipelineConfig, error::ScoringResult};
use rusqlite::params;

impl ScoringStore {
    // ── Prediction columns ─────────────────────────────────────

    pub fn table_columns(&self, table: &str) -> ScoringResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let cols = stmt
            .query_map(params![table], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(cols)
    }

    /// Add the processed marker and every configured output column that the
    /// source table lacks, each `NOT NULL DEFAULT 0`. Returns the columns added.
    pub fn ensure_output_columns(&self, cfg: &PipelineConfig) -> ScoringResult<Vec<String>> {
        let existing = self.table_columns(&cfg.table)?;
        let mut wanted: Vec<(&str, &str)> = cfg.outputs.typed_columns();
        wanted.push((cfg.processed_column.as_str(), "INTEGER"));

        let tx = self.conn.unchecked_transaction()?;
        let mut added: Vec<String> = Vec::new();
        for (col, sql_type) in wanted {
            if existing.iter().any(|c| c == col) || added.iter().any(|c| c == col) {
                continue;
            }
            tx.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {sql_type} NOT NULL DEFAULT 0;",
                quote_ident(&cfg.table),
                quote_ident(col),
            ))?;
            added.push(col.to_string());
        }
        tx.commit()?;

        if !added.is_empty() {
            log::info!("{}: added columns {:?} to {}", cfg.name, added, cfg.table);
        }
        Ok(added)
    }

    /// Remove the processed marker and output columns. Returns the columns dropped.
    pub fn drop_output_columns(&self, cfg: &PipelineConfig) -> ScoringResult<Vec<String>> {
        let existing = self.table_columns(&cfg.table)?;
        let mut targets: Vec<&str> = cfg.outputs.typed_columns().into_iter().map(|(c, _)| c).collect();
        targets.push(cfg.processed_column.as_str());

        let tx = self.conn.unchecked_transaction()?;
        let mut dropped: Vec<String> = Vec::new();
        for col in targets {
            if !existing.iter().any(|c| c == col) || dropped.iter().any(|c| c == col) {
                continue;
            }
            tx.execute_batch(&format!(
                "ALTER TABLE {} DROP COLUMN {};",
                quote_ident(&cfg.table),
                quote_ident(col),
            ))?;
            dropped.push(col.to_string());
        }
        tx.commit()?;

        if !dropped.is_empty() {
            log::info!("{}: dropped columns {:?} from {}", cfg.name, dropped, cfg.table);
        }
        Ok(dropped)
    }

    // ── Summary ────────────────────────────────────────────────

    pub fn prediction_summary(&self, cfg: &PipelineConfig) -> ScoringResult<PredictionSummary> {
        let processed = quote_ident(&cfg.processed_column);
        let verdict = quote_ident(&cfg.outputs.verdict);
        let sql = format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN {processed} = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN {processed} = 1 AND {verdict} = 1 THEN 1 ELSE 0 END), 0)
             FROM {}",
            quote_ident(&cfg.table),
        );
        let (total_rows, processed_rows, predicted_positive): (i64, i64, i64) =
            self.conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;

        let positive_rate = if processed_rows > 0 {
            predicted_positive as f64 / processed_rows as f64 * 100.0
        } else {
            0.0
        };
        Ok(PredictionSummary {
            pipeline: cfg.name.clone(),
            total_rows,
            processed_rows,
            pending_rows: total_rows - processed_rows,
            predicted_positive,
            positive_rate,
        })
    }
}
