use super::{quote_ident, Reconciled, ScoringRunRow, ScoringStore};
use crate::{
    config::PipelineConfig,
    error::ScoringResult,
    frame::FeatureFrame,
    job::PredictionRecord,
    types::Value,
};
use rusqlite::params_from_iter;
use std::collections::HashSet;

impl ScoringStore {
    // ── Fetch ──────────────────────────────────────────────────

    /// All rows whose processed marker is 0 or NULL, capped at the
    /// pipeline's batch limit.
    pub fn fetch_pending(&self, cfg: &PipelineConfig) -> ScoringResult<FeatureFrame> {
        let limit = cfg
            .batch_limit
            .map(|n| format!(" LIMIT {n}"))
            .unwrap_or_default();
        let processed = quote_ident(&cfg.processed_column);
        let sql = format!(
            "SELECT * FROM {} WHERE {processed} = 0 OR {processed} IS NULL{limit}",
            quote_ident(&cfg.table),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let values = (0..width)
                .map(|i| row.get_ref(i).map(Value::from))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(values);
        }

        FeatureFrame::assemble(columns, rows)
    }

    pub fn pending_count(&self, cfg: &PipelineConfig) -> ScoringResult<i64> {
        let processed = quote_ident(&cfg.processed_column);
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {processed} = 0 OR {processed} IS NULL",
            quote_ident(&cfg.table),
        );
        self.conn.query_row(&sql, [], |row| row.get(0)).map_err(Into::into)
    }

    // ── Reconcile ──────────────────────────────────────────────

    /// Write every keyed prediction back to its source row, mark it
    /// processed and append the run log row, all in one transaction.
    ///
    /// Any error drops the transaction uncommitted, so a failed run leaves
    /// every row pending. Updates are keyed on `key_column` alone, so rows
    /// sharing a key cannot be told apart; they are counted once and
    /// reported as ambiguous.
    pub fn reconcile(
        &self,
        cfg: &PipelineConfig,
        records: &[PredictionRecord],
        run: &ScoringRunRow,
    ) -> ScoringResult<Reconciled> {
        let out = &cfg.outputs;
        let mut assignments: Vec<String> = Vec::new();
        for col in out.base_scores.iter().flatten() {
            assignments.push(quote_ident(col));
        }
        assignments.push(quote_ident(&out.verdict));
        if let Some(col) = &out.probability {
            assignments.push(quote_ident(col));
        }
        if let Some(col) = &out.threshold {
            assignments.push(quote_ident(col));
        }
        let mut set_clause: Vec<String> = assignments
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", i + 1))
            .collect();
        set_clause.push(format!("{} = 1", quote_ident(&cfg.processed_column)));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_ident(&cfg.table),
            set_clause.join(", "),
            quote_ident(&cfg.key_column),
            assignments.len() + 1,
        );

        let tx = self.conn.unchecked_transaction()?;
        let mut result = Reconciled::default();
        let mut written: HashSet<String> = HashSet::new();
        let mut ambiguous: HashSet<String> = HashSet::new();
        {
            let mut stmt = tx.prepare(&sql)?;
            for rec in records {
                let Some(key) = &rec.key else {
                    continue;
                };

                let mut values: Vec<Value> = Vec::with_capacity(assignments.len() + 1);
                for (i, col) in out.base_scores.iter().enumerate() {
                    if col.is_some() {
                        values.push(Value::Float(rec.base_scores[i]));
                    }
                }
                values.push(Value::Int(i64::from(rec.verdict)));
                if out.probability.is_some() {
                    values.push(Value::Float(rec.score));
                }
                if out.threshold.is_some() {
                    values.push(Value::Float(rec.threshold));
                }
                values.push(key.clone());

                let changed = stmt.execute(params_from_iter(values.iter()))?;
                let label = key.label();
                if changed == 0 {
                    log::warn!("{}: no row in {} matched key {label}", cfg.name, cfg.table);
                } else if changed > 1 && ambiguous.insert(label.clone()) {
                    log::warn!(
                        "{}: key {label} matches {changed} rows in {}; all of them received the same prediction",
                        cfg.name,
                        cfg.table
                    );
                }
                if written.insert(label) {
                    result.rows_updated += changed;
                }
            }
        }
        result.ambiguous_keys = ambiguous.len();
        super::run_log::insert_run(&tx, run)?;
        tx.commit()?;
        Ok(result)
    }
}
