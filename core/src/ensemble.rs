//! Stacked ensemble: two base estimators feed one meta estimator.
//!
//! Loaded once per process and shared read-only across every run.

use crate::{
    config::ArtifactConfig,
    encoding::{coerce_numeric, EncoderRegistry, NumericMatrix},
    error::{ScoringError, ScoringResult},
    frame::FeatureFrame,
    model::Estimator,
    scaler::StandardScaler,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Meta-model input width: one score per base model.
pub const META_INPUTS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleScore {
    pub base_scores: [f64; 2],
    /// The meta model's `predict` output (a label for classifiers).
    pub meta_raw: f64,
    pub meta_probability: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ModelEnsemble {
    scaler: StandardScaler,
    base: [Estimator; 2],
    meta: Estimator,
}

impl ModelEnsemble {
    pub fn new(scaler: StandardScaler, base: [Estimator; 2], meta: Estimator) -> ScoringResult<Self> {
        scaler.validate().map_err(|reason| invalid("scaler", reason))?;
        let width = scaler.columns.len();
        for (i, b) in base.iter().enumerate() {
            b.validate(width).map_err(|reason| invalid(&format!("base model {i}"), reason))?;
        }
        meta.validate(META_INPUTS).map_err(|reason| invalid("meta model", reason))?;
        Ok(Self { scaler, base, meta })
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn scale(&self, matrix: &NumericMatrix) -> ScoringResult<Vec<Vec<f64>>> {
        self.scaler.transform(matrix)
    }

    /// Score already-scaled rows.
    pub fn infer(&self, scaled: &[Vec<f64>]) -> Vec<EnsembleScore> {
        scaled
            .iter()
            .map(|x| {
                let base_scores = [self.base[0].predict(x), self.base[1].predict(x)];
                EnsembleScore {
                    base_scores,
                    meta_raw: self.meta.predict(&base_scores),
                    meta_probability: self.meta.predict_proba(&base_scores),
                }
            })
            .collect()
    }
}

/// Everything one pipeline needs to turn a frame into ensemble scores.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub columns: Vec<String>,
    pub encoders: EncoderRegistry,
    pub ensemble: ModelEnsemble,
}

/// A frame after alignment, encoding and scaling.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub scaled: Vec<Vec<f64>>,
    pub added_columns: Vec<String>,
    pub dropped_columns: Vec<String>,
    pub filled_cells: usize,
}

impl ModelBundle {
    pub fn new(
        columns: Vec<String>,
        encoders: EncoderRegistry,
        ensemble: ModelEnsemble,
    ) -> ScoringResult<Self> {
        if ensemble.scaler().columns != columns {
            return Err(invalid(
                "scaler",
                "fit-time columns differ from the training column list".into(),
            ));
        }
        Ok(Self { columns, encoders, ensemble })
    }

    /// Load `<models_dir>/<artifacts.dir>/…` as named in `artifacts`.
    pub fn load(models_dir: &Path, artifacts: &ArtifactConfig) -> ScoringResult<Self> {
        let dir = models_dir.join(&artifacts.dir);
        let columns: Vec<String> = read_artifact(&dir, &artifacts.columns)?;
        let encoders: EncoderRegistry = read_artifact(&dir, &artifacts.encoders)?;
        let scaler: StandardScaler = read_artifact(&dir, &artifacts.scaler)?;
        let base = [
            read_artifact(&dir, &artifacts.base_models[0])?,
            read_artifact(&dir, &artifacts.base_models[1])?,
        ];
        let meta = read_artifact(&dir, &artifacts.meta_model)?;

        for (col, enc) in encoders.iter() {
            if !enc.has_trained_unknown() {
                log::debug!(
                    "encoder '{col}': no trained \"unknown\" class, reserved code {}",
                    enc.unknown_code()
                );
            }
        }

        let bundle = Self::new(columns, encoders, ModelEnsemble::new(scaler, base, meta)?)?;
        log::info!(
            "loaded model bundle from {} ({} features, {} encoders)",
            dir.display(),
            bundle.columns.len(),
            bundle.encoders.iter().count()
        );
        Ok(bundle)
    }

    /// Align → encode → coerce → scale.
    pub fn prepare(&self, frame: &FeatureFrame) -> ScoringResult<PreparedBatch> {
        let aligned = frame.align(&self.columns);
        let mut features = aligned.frame;
        self.encoders.encode_frame(&mut features);
        let matrix = coerce_numeric(&features);
        let scaled = self.ensemble.scale(&matrix)?;
        Ok(PreparedBatch {
            scaled,
            added_columns: aligned.added,
            dropped_columns: aligned.dropped,
            filled_cells: matrix.filled_cells,
        })
    }
}

fn read_artifact<T: DeserializeOwned>(dir: &Path, name: &str) -> ScoringResult<T> {
    let path: PathBuf = dir.join(name);
    let content = std::fs::read_to_string(&path)
        .map_err(|e| invalid(&path.display().to_string(), format!("cannot read: {e}")))?;
    serde_json::from_str(&content)
        .map_err(|e| invalid(&path.display().to_string(), format!("cannot parse: {e}")))
}

fn invalid(name: &str, reason: String) -> ScoringError {
    ScoringError::InvalidArtifact { name: name.to_string(), reason }
}
