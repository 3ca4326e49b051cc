//! The scoring job: one parametrized pipeline per source table.
//!
//! STAGES (fixed, strictly sequential):
//!   1. Fetch rows whose processed marker is unset
//!   2. Assemble them into a frame
//!   3. Preprocess, align, encode, scale, run the stacked ensemble
//!   4. Apply the decision policy to the whole batch
//!   5. Reconcile in one transaction, then forward to the stream
//!
//! A run never returns an error to the scheduler. Failures are logged and
//! the still-pending rows are picked up again on the next occurrence.

use crate::{
    clock::TimerInfo,
    config::{ConnectionSettings, PipelineConfig},
    ensemble::ModelBundle,
    error::ScoringResult,
    event::ScoredEvent,
    frame::FeatureFrame,
    sink::EventSink,
    store::{ScoringRunRow, ScoringStore},
    types::{RunId, Value},
};
use chrono::{DateTime, Utc};
use std::{path::Path, sync::Arc};

// ── Public types ─────────────────────────────────────────────────────────────

/// Scored output for one source row.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub key: Option<Value>,
    pub base_scores: [f64; 2],
    pub verdict: u8,
    /// The value the verdict was taken from.
    pub score: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBatch {
    pub records: Vec<PredictionRecord>,
    pub threshold: f64,
    pub positives: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub pipeline: String,
    pub rows_scored: usize,
    pub rows_updated: usize,
    /// Scored rows without a key; never written back.
    pub rows_skipped: usize,
    /// Keys shared by more than one source row.
    pub ambiguous_keys: usize,
    pub positives: usize,
    pub positive_rate: f64,
    pub threshold: f64,
    pub published: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    NothingPending,
    Scored(RunSummary),
    Failed(String),
}

// ── Job ──────────────────────────────────────────────────────────────────────

pub struct ScoringJob {
    config: PipelineConfig,
    bundle: Arc<ModelBundle>,
}

impl ScoringJob {
    pub fn new(config: PipelineConfig, bundle: Arc<ModelBundle>) -> Self {
        Self { config, bundle }
    }

    /// Load the pipeline's artifacts from `models_dir`.
    pub fn load(config: PipelineConfig, models_dir: &Path) -> ScoringResult<Self> {
        let bundle = ModelBundle::load(models_dir, &config.artifacts)?;
        Ok(Self::new(config, Arc::new(bundle)))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stages 3–4: a pure function of the fetched frame.
    pub fn score(&self, frame: &FeatureFrame) -> ScoringResult<ScoredBatch> {
        let name = &self.config.name;
        let pre = &self.config.preprocess;

        let mut features = frame.clone();
        features.drop_columns(&pre.drop_columns);
        features.fill_nulls(&pre.fill_columns, &pre.fill_value);
        features.map_flags(&pre.flag_columns);
        features.one_hot(&pre.one_hot_columns, &pre.one_hot_fill);

        let prepared = self.bundle.prepare(&features)?;
        if !prepared.dropped_columns.is_empty() {
            log::info!("{name}: dropped unexpected columns {:?}", prepared.dropped_columns);
        }
        if !prepared.added_columns.is_empty() {
            log::debug!("{name}: filled missing columns with 0: {:?}", prepared.added_columns);
        }
        if prepared.filled_cells > 0 {
            log::warn!(
                "{name}: {} missing or non-numeric cells filled with 0",
                prepared.filled_cells
            );
        }

        let scores = self.bundle.ensemble.infer(&prepared.scaled);
        let decisions = self.config.policy.decide(&scores);

        let keys: Vec<Option<Value>> = match frame.column(&self.config.key_column) {
            Some(col) => col.map(|v| (!v.is_null()).then(|| v.clone())).collect(),
            None => vec![None; frame.len()],
        };

        let records = keys
            .into_iter()
            .zip(&scores)
            .zip(decisions.scores.iter().zip(&decisions.verdicts))
            .map(|((key, s), (score, verdict))| PredictionRecord {
                key,
                base_scores: s.base_scores,
                verdict: *verdict,
                score: *score,
                threshold: decisions.threshold,
            })
            .collect();

        Ok(ScoredBatch {
            records,
            threshold: decisions.threshold,
            positives: decisions.positives(),
        })
    }

    /// Open the store, run once, close it. Never fails: errors are logged
    /// and reported as `RunOutcome::Failed`. The connection lives only for
    /// the duration of the run.
    pub fn run(
        &self,
        db: &ConnectionSettings,
        sink: Option<&dyn EventSink>,
        timer: &TimerInfo,
    ) -> RunOutcome {
        let result = ScoringStore::open(&db.connection_string).and_then(|store| {
            store.migrate()?;
            self.run_with_store(&store, sink, timer)
        });
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("{}: processing failed: {e}", self.config.name);
                RunOutcome::Failed(e.to_string())
            }
        }
    }

    pub fn run_with_store(
        &self,
        store: &ScoringStore,
        sink: Option<&dyn EventSink>,
        timer: &TimerInfo,
    ) -> ScoringResult<RunOutcome> {
        let cfg = &self.config;
        let name = &cfg.name;
        let started_at = Utc::now();
        if timer.past_due {
            log::info!("{name}: timer is past due (scheduled for {})", timer.scheduled_for);
        }

        let frame = store.fetch_pending(cfg)?;
        if frame.is_empty() {
            log::info!("{name}: no unprocessed rows in {}", cfg.table);
            return Ok(RunOutcome::NothingPending);
        }

        let run_id = format!("{name}-{}", uuid::Uuid::new_v4());
        let batch = self.score(&frame)?;

        let rows_scored = batch.records.len();
        let rows_skipped = batch.records.iter().filter(|r| r.key.is_none()).count();
        if rows_skipped > 0 {
            log::warn!(
                "{name}: {rows_skipped} rows have no {} and will not be written back",
                cfg.key_column
            );
        }
        let positive_rate = batch.positives as f64 / rows_scored as f64 * 100.0;
        log::info!(
            "{name}: run={run_id} scored={rows_scored} positive={} rate={positive_rate:.2}% threshold={}",
            batch.positives,
            batch.threshold,
        );

        let finished_at = Utc::now();
        let run_row = ScoringRunRow {
            run_id: run_id.clone(),
            pipeline: name.clone(),
            source_table: cfg.table.clone(),
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            rows_scored: rows_scored as i64,
            rows_skipped: rows_skipped as i64,
            positives: batch.positives as i64,
            threshold: batch.threshold,
            past_due: timer.past_due,
        };
        let reconciled = store.reconcile(cfg, &batch.records, &run_row)?;
        log::info!(
            "{name}: committed {} prediction rows to {}",
            reconciled.rows_updated,
            cfg.table
        );

        let published = match (sink, &cfg.stream) {
            (Some(sink), Some(destination)) => {
                self.forward(sink, destination, &run_id, &frame, &batch, finished_at)
            }
            _ => 0,
        };

        Ok(RunOutcome::Scored(RunSummary {
            run_id,
            pipeline: name.clone(),
            rows_scored,
            rows_updated: reconciled.rows_updated,
            rows_skipped,
            ambiguous_keys: reconciled.ambiguous_keys,
            positives: batch.positives,
            positive_rate,
            threshold: batch.threshold,
            published,
        }))
    }

    /// Publish every committed record. Returns how many were accepted.
    fn forward(
        &self,
        sink: &dyn EventSink,
        destination: &str,
        run_id: &str,
        frame: &FeatureFrame,
        batch: &ScoredBatch,
        scored_at: DateTime<Utc>,
    ) -> usize {
        let name = &self.config.name;
        let pending = frame.records(&self.config.key_column);

        let mut events = Vec::with_capacity(batch.records.len());
        for (row, rec) in pending.into_iter().zip(&batch.records) {
            let Some(key) = &rec.key else {
                continue;
            };
            let event = ScoredEvent {
                run_id: run_id.to_string(),
                pipeline: name.clone(),
                key: key.to_json(),
                base_scores: rec.base_scores,
                verdict: rec.verdict,
                score: rec.score,
                threshold: rec.threshold,
                scored_at,
                record: row.fields,
            };
            match serde_json::to_value(&event) {
                Ok(v) => events.push(v),
                Err(e) => log::warn!("{name}: cannot serialize event for {}: {e}", key.label()),
            }
        }
        if events.is_empty() {
            return 0;
        }

        match sink.publish(destination, &events) {
            Ok(()) => {
                log::info!(
                    "{name}: sent {} records to {destination} via {}",
                    events.len(),
                    sink.name()
                );
                events.len()
            }
            Err(e) => {
                log::error!("{name}: publishing to {destination} via {} failed: {e}", sink.name());
                0
            }
        }
    }
}
