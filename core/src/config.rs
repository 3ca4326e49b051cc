use crate::{
    decision::DecisionPolicy,
    error::{ScoringError, ScoringResult},
};
use serde::{Deserialize, Serialize};

// ── Pipeline configuration ─────────────────────────────────────────

/// Column rewrites applied to the raw frame before alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    #[serde(default)]
    pub drop_columns: Vec<String>,
    /// Columns whose NULL cells are replaced by `fill_value` before encoding.
    #[serde(default)]
    pub fill_columns: Vec<String>,
    #[serde(default = "default_fill_value")]
    pub fill_value: String,
    /// yes/no/true/false/1/0 columns rewritten as 1/0.
    #[serde(default)]
    pub flag_columns: Vec<String>,
    /// Columns expanded into `<col>_<value>` indicators.
    #[serde(default)]
    pub one_hot_columns: Vec<String>,
    #[serde(default = "default_one_hot_fill")]
    pub one_hot_fill: String,
}

fn default_fill_value() -> String {
    "No".into()
}

fn default_one_hot_fill() -> String {
    "Unknown".into()
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            drop_columns: Vec::new(),
            fill_columns: Vec::new(),
            fill_value: default_fill_value(),
            flag_columns: Vec::new(),
            one_hot_columns: Vec::new(),
            one_hot_fill: default_one_hot_fill(),
        }
    }
}

/// Artifact file names inside `<models_dir>/<dir>/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub dir: String,
    pub columns: String,
    pub encoders: String,
    pub scaler: String,
    pub base_models: [String; 2],
    pub meta_model: String,
}

/// Source-table columns the reconciliation step writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputColumns {
    #[serde(default)]
    pub base_scores: [Option<String>; 2],
    pub verdict: String,
    #[serde(default)]
    pub probability: Option<String>,
    #[serde(default)]
    pub threshold: Option<String>,
}

impl OutputColumns {
    /// Every configured output column with its SQL type.
    pub fn typed_columns(&self) -> Vec<(&str, &'static str)> {
        let mut cols = Vec::new();
        for c in self.base_scores.iter().flatten() {
            cols.push((c.as_str(), "REAL"));
        }
        cols.push((self.verdict.as_str(), "INTEGER"));
        if let Some(c) = &self.probability {
            cols.push((c.as_str(), "REAL"));
        }
        if let Some(c) = &self.threshold {
            cols.push((c.as_str(), "REAL"));
        }
        cols
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub table: String,
    pub key_column: String,
    #[serde(default = "default_processed_column")]
    pub processed_column: String,
    #[serde(default)]
    pub batch_limit: Option<usize>,
    /// Cron expression with a seconds field.
    pub schedule: String,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    pub artifacts: ArtifactConfig,
    pub policy: DecisionPolicy,
    pub outputs: OutputColumns,
    /// Stream destination for scored records; `None` disables forwarding.
    #[serde(default)]
    pub stream: Option<String>,
}

fn default_processed_column() -> String {
    "Processed".into()
}

impl PipelineConfig {
    /// Customer churn scoring over `ChurnTable`, every minute.
    pub fn churn_default() -> Self {
        let drop = [
            "customer_id", "count", "zip_code", "lat_long", "surname", "rownumber",
            "state", "city", "latitude", "longitude", "churn_reason", "churn_score",
            "churn_value", "geography",
        ];
        let one_hot = [
            "internet_service", "online_security", "online_backup", "device_protection",
            "tech_support", "streaming_tv", "streaming_movies", "payment_method",
            "contract", "preferredlogindevice", "preferedordercat", "preferredpaymentmode",
        ];
        let fill = [
            "gender", "senior_citizen", "partner", "dependents", "phone_service",
            "paperless_billing", "complain", "maritalstatus",
        ];
        Self {
            name: "churn".into(),
            table: "ChurnTable".into(),
            key_column: "customer_id".into(),
            processed_column: default_processed_column(),
            batch_limit: Some(1000),
            schedule: "0 */1 * * * *".into(),
            preprocess: PreprocessConfig {
                drop_columns: drop.iter().map(|s| s.to_string()).collect(),
                fill_columns: fill.iter().map(|s| s.to_string()).collect(),
                fill_value: default_fill_value(),
                flag_columns: vec!["churn".into()],
                one_hot_columns: one_hot.iter().map(|s| s.to_string()).collect(),
                one_hot_fill: default_one_hot_fill(),
            },
            artifacts: ArtifactConfig {
                dir: "churn".into(),
                columns: "X_train_columns.json".into(),
                encoders: "label_encoders.json".into(),
                scaler: "scaler.json".into(),
                base_models: ["gbr_model.json".into(), "rf_model.json".into()],
                meta_model: "meta_model.json".into(),
            },
            policy: DecisionPolicy::churn_default(),
            outputs: OutputColumns {
                base_scores: [Some("GBR_Prediction".into()), Some("RF_Prediction".into())],
                verdict: "PredictedChurn".into(),
                probability: Some("ChurnProbability".into()),
                threshold: Some("ChurnThreshold".into()),
            },
            stream: None,
        }
    }

    /// Transaction fraud scoring over `FraudTable`, every two minutes.
    pub fn fraud_default() -> Self {
        Self {
            name: "fraud".into(),
            table: "FraudTable".into(),
            key_column: "TransactionID".into(),
            processed_column: default_processed_column(),
            batch_limit: None,
            schedule: "0 */2 * * * *".into(),
            preprocess: PreprocessConfig::default(),
            artifacts: ArtifactConfig {
                dir: "fraud".into(),
                columns: "x_column_names.json".into(),
                encoders: "label_encoder.json".into(),
                scaler: "scaler.json".into(),
                base_models: ["lr_model.json".into(), "rf_model.json".into()],
                meta_model: "meta_model.json".into(),
            },
            policy: DecisionPolicy::fraud_default(),
            outputs: OutputColumns {
                base_scores: [Some("LR_Prediction".into()), Some("RF_Prediction".into())],
                verdict: "Meta_Prediction".into(),
                probability: None,
                threshold: None,
            },
            stream: Some("fraud-predictions".into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RunnerConfigFile {
    pipelines: Vec<PipelineConfig>,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub pipelines: Vec<PipelineConfig>,
}

impl RunnerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: RunnerConfigFile = serde_json::from_str(&content)?;
        Ok(Self { pipelines: file.pipelines })
    }

    /// The two deployed pipelines with their built-in settings.
    pub fn builtin() -> Self {
        Self {
            pipelines: vec![PipelineConfig::churn_default(), PipelineConfig::fraud_default()],
        }
    }

    pub fn pipeline(&self, name: &str) -> ScoringResult<&PipelineConfig> {
        self.pipelines
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ScoringError::PipelineNotFound { name: name.to_string() })
    }
}

// ── Connection settings ────────────────────────────────────────────

/// Where the relational store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub connection_string: String,
}

impl ConnectionSettings {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self { connection_string: connection_string.into() }
    }

    /// `SCORING_DB` if set, otherwise `<SQL_SERVER>/<SQL_DATABASE>.db`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        if let Some(db) = get("SCORING_DB").filter(|s| !s.is_empty()) {
            return Ok(Self::new(db));
        }
        let server = get("SQL_SERVER").filter(|s| !s.is_empty());
        let database = get("SQL_DATABASE")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("neither SCORING_DB nor SQL_DATABASE is set"))?;
        let file = if database.ends_with(".db") { database } else { format!("{database}.db") };
        Ok(match server {
            Some(server) => Self::new(format!("{}/{file}", server.trim_end_matches('/'))),
            None => Self::new(file),
        })
    }
}

// ── Sink settings ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkSettings {
    /// Append JSON lines to `<dir>/<destination>.jsonl`.
    JsonLines { dir: String },
    /// POST JSON arrays to `<endpoint>/<destination>/messages`.
    Http { endpoint: String, token: Option<String> },
}

impl SinkSettings {
    /// Parse `SCORING_SINK` (`jsonl:<dir>` or an http(s) URL) with an
    /// optional `SCORING_SINK_TOKEN`.
    pub fn from_env() -> Option<Self> {
        Self::parse(
            &std::env::var("SCORING_SINK").ok()?,
            std::env::var("SCORING_SINK_TOKEN").ok(),
        )
    }

    pub fn parse(spec: &str, token: Option<String>) -> Option<Self> {
        let spec = spec.trim();
        if let Some(dir) = spec.strip_prefix("jsonl:") {
            return Some(SinkSettings::JsonLines { dir: dir.to_string() });
        }
        if spec.starts_with("http://") || spec.starts_with("https://") {
            return Some(SinkSettings::Http {
                endpoint: spec.trim_end_matches('/').to_string(),
                token: token.filter(|t| !t.is_empty()),
            });
        }
        None
    }
}
