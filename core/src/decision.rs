//! Decision policies: turn a batch of meta-model outputs into verdicts.
//!
//! A policy always sees the whole batch. The batch-adaptive policy picks
//! one threshold from the batch maximum, so a row's verdict depends on
//! every other row scored in the same run.

use crate::ensemble::EnsembleScore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTier {
    /// Tier applies when the batch maximum is strictly above this value.
    pub batch_max_above: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// verdict = 1 when the meta model's raw output is strictly below
    /// `cutoff`. Positive class on the low side, as deployed for fraud.
    BelowCutoff { cutoff: f64 },
    /// Threshold chosen from the batch's maximum probability: the first tier
    /// (in order) whose `batch_max_above` is exceeded, else `floor`.
    /// verdict = 1 when probability >= threshold.
    BatchAdaptive {
        tiers: Vec<ThresholdTier>,
        floor: f64,
    },
}

/// Per-batch policy output.
#[derive(Debug, Clone, PartialEq)]
pub struct Decisions {
    pub threshold: f64,
    /// The value each verdict was taken from.
    pub scores: Vec<f64>,
    pub verdicts: Vec<u8>,
}

impl Decisions {
    pub fn positives(&self) -> usize {
        self.verdicts.iter().filter(|v| **v == 1).count()
    }
}

impl DecisionPolicy {
    /// The churn rule: max > 0.7 → 0.5, max > 0.4 → 0.3, else 0.1.
    pub fn churn_default() -> Self {
        DecisionPolicy::BatchAdaptive {
            tiers: vec![
                ThresholdTier { batch_max_above: 0.7, threshold: 0.5 },
                ThresholdTier { batch_max_above: 0.4, threshold: 0.3 },
            ],
            floor: 0.1,
        }
    }

    /// The fraud rule: meta output < 0.3 → 1.
    pub fn fraud_default() -> Self {
        DecisionPolicy::BelowCutoff { cutoff: 0.3 }
    }

    /// Threshold the batch-adaptive rule selects for a given batch maximum.
    pub fn threshold_for_max(&self, batch_max: f64) -> f64 {
        match self {
            DecisionPolicy::BelowCutoff { cutoff } => *cutoff,
            DecisionPolicy::BatchAdaptive { tiers, floor } => tiers
                .iter()
                .find(|t| batch_max > t.batch_max_above)
                .map_or(*floor, |t| t.threshold),
        }
    }

    pub fn decide(&self, batch: &[EnsembleScore]) -> Decisions {
        match self {
            DecisionPolicy::BelowCutoff { cutoff } => {
                let scores: Vec<f64> = batch.iter().map(|s| s.meta_raw).collect();
                let verdicts = scores.iter().map(|s| u8::from(*s < *cutoff)).collect();
                Decisions { threshold: *cutoff, scores, verdicts }
            }
            DecisionPolicy::BatchAdaptive { .. } => {
                // Regressor metas have no probability; fall back to the raw output.
                let scores: Vec<f64> = batch
                    .iter()
                    .map(|s| s.meta_probability.unwrap_or(s.meta_raw))
                    .collect();
                self.decide_probabilities(scores)
            }
        }
    }

    /// Batch-adaptive decision over a bare probability vector.
    pub fn decide_probabilities(&self, scores: Vec<f64>) -> Decisions {
        let batch_max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let threshold = self.threshold_for_max(batch_max);
        let verdicts = match self {
            DecisionPolicy::BelowCutoff { .. } => {
                scores.iter().map(|s| u8::from(*s < threshold)).collect()
            }
            DecisionPolicy::BatchAdaptive { .. } => {
                scores.iter().map(|s| u8::from(*s >= threshold)).collect()
            }
        };
        Decisions { threshold, scores, verdicts }
    }
}
