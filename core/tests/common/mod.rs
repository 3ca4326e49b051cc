//! Shared fixtures: shared-cache in-memory databases, hand-built model
//! bundles and sinks that record or refuse what they are given.

#![allow(dead_code)]

use rusqlite::{Connection, OpenFlags};
use scoring_core::{
    config::{ConnectionSettings, PipelineConfig},
    encoding::{CategoricalEncoder, EncoderRegistry},
    ensemble::{ModelBundle, ModelEnsemble},
    error::{ScoringError, ScoringResult},
    job::ScoringJob,
    model::{DecisionTree, Estimator, Task, TreeNode},
    scaler::StandardScaler,
    sink::EventSink,
};
use std::sync::{Arc, Mutex};

// ── Databases ────────────────────────────────────────────────────────────────

/// A named shared-cache memory database. The returned connection keeps it
/// alive for the test; every `ConnectionSettings` open sees the same data.
pub fn shared_db(name: &str) -> (ConnectionSettings, Connection) {
    let _ = env_logger::builder().is_test(true).try_init();
    let uri = format!("file:{name}?mode=memory&cache=shared");
    let conn = Connection::open_with_flags(
        &uri,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_URI,
    )
    .unwrap();
    (ConnectionSettings::new(uri), conn)
}

pub fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

// ── Fraud fixture ────────────────────────────────────────────────────────────

pub const FRAUD_TABLE: &str = "
    CREATE TABLE FraudTable (
        TransactionID   TEXT,
        amount          REAL,
        card_type       TEXT,
        LR_Prediction   REAL    NOT NULL DEFAULT 0,
        RF_Prediction   REAL    NOT NULL DEFAULT 0,
        Meta_Prediction INTEGER NOT NULL DEFAULT 0,
        Processed       INTEGER NOT NULL DEFAULT 0
    );";

pub fn seed_fraud(conn: &Connection, rows: &[(&str, f64, &str)]) {
    conn.execute_batch(FRAUD_TABLE).unwrap();
    for (id, amount, card) in rows {
        conn.execute(
            "INSERT INTO FraudTable (TransactionID, amount, card_type) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, amount, card],
        )
        .unwrap();
    }
}

fn identity_scaler(columns: &[&str]) -> StandardScaler {
    StandardScaler {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        mean: vec![0.0; columns.len()],
        scale: vec![1.0; columns.len()],
    }
}

/// Features `[amount, card_type]`, identity scaling. The second base model
/// passes `amount` through and the meta model passes that through, so the
/// meta output of each row equals its amount.
pub fn fraud_bundle() -> ModelBundle {
    let columns = ["amount", "card_type"];
    let mut encoders = EncoderRegistry::new();
    encoders.insert("card_type", CategoricalEncoder::new(vec!["credit".into(), "debit".into()]));

    let ensemble = ModelEnsemble::new(
        identity_scaler(&columns),
        [
            Estimator::LogisticRegression { coefficients: vec![1.0, 0.0], intercept: 0.0 },
            Estimator::LinearRegression { coefficients: vec![1.0, 0.0], intercept: 0.0 },
        ],
        Estimator::LinearRegression { coefficients: vec![0.0, 1.0], intercept: 0.0 },
    )
    .unwrap();
    ModelBundle::new(columns.iter().map(|c| c.to_string()).collect(), encoders, ensemble).unwrap()
}

pub fn fraud_job() -> ScoringJob {
    ScoringJob::new(PipelineConfig::fraud_default(), Arc::new(fraud_bundle()))
}

// ── Churn fixture ────────────────────────────────────────────────────────────

pub const CHURN_TABLE: &str = "
    CREATE TABLE ChurnTable (
        customer_id      TEXT PRIMARY KEY,
        contract         TEXT,
        tenure           INTEGER,
        logit            REAL,
        churn            TEXT,
        GBR_Prediction   REAL    NOT NULL DEFAULT 0,
        RF_Prediction    REAL    NOT NULL DEFAULT 0,
        PredictedChurn   INTEGER NOT NULL DEFAULT 0,
        ChurnProbability REAL    NOT NULL DEFAULT 0,
        ChurnThreshold   REAL    NOT NULL DEFAULT 0,
        Processed        INTEGER NOT NULL DEFAULT 0
    );";

/// Insert customers whose meta probability will be `p`.
pub fn seed_churn(conn: &Connection, rows: &[(&str, &str, f64)]) {
    conn.execute_batch(CHURN_TABLE).unwrap();
    for (id, contract, p) in rows {
        let logit = (p / (1.0 - p)).ln();
        conn.execute(
            "INSERT INTO ChurnTable (customer_id, contract, tenure, logit, churn)
             VALUES (?1, ?2, 12, ?3, 'No')",
            rusqlite::params![id, contract, logit],
        )
        .unwrap();
    }
}

/// Features after one-hot expansion. The second base model passes `logit`
/// through and the logistic meta model turns it back into a probability.
pub fn churn_bundle() -> ModelBundle {
    let columns = ["tenure", "logit", "contract_Month-to-month", "contract_Two year"];
    let stump = DecisionTree {
        nodes: vec![
            TreeNode::Split { feature: 2, threshold: 0.5, left: 1, right: 2 },
            TreeNode::Leaf { value: 0.1 },
            TreeNode::Leaf { value: 0.9 },
        ],
    };
    let ensemble = ModelEnsemble::new(
        identity_scaler(&columns),
        [
            Estimator::GradientBoosting {
                task: Task::Regression,
                init: 0.0,
                learning_rate: 1.0,
                trees: vec![stump],
            },
            Estimator::LinearRegression { coefficients: vec![0.0, 1.0, 0.0, 0.0], intercept: 0.0 },
        ],
        Estimator::LogisticRegression { coefficients: vec![0.0, 1.0], intercept: 0.0 },
    )
    .unwrap();
    ModelBundle::new(
        columns.iter().map(|c| c.to_string()).collect(),
        EncoderRegistry::new(),
        ensemble,
    )
    .unwrap()
}

pub fn churn_job() -> ScoringJob {
    ScoringJob::new(PipelineConfig::churn_default(), Arc::new(churn_bundle()))
}

// ── Sinks ────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub batches: Arc<Mutex<Vec<(String, Vec<serde_json::Value>)>>>,
}

impl RecordingSink {
    pub fn published(&self) -> Vec<serde_json::Value> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, records)| records.clone())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn publish(&self, destination: &str, records: &[serde_json::Value]) -> ScoringResult<()> {
        self.batches.lock().unwrap().push((destination.to_string(), records.to_vec()));
        Ok(())
    }
}

pub struct FailingSink;

impl EventSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn publish(&self, destination: &str, _records: &[serde_json::Value]) -> ScoringResult<()> {
        Err(ScoringError::SinkRejected {
            sink: "failing".into(),
            destination: destination.into(),
            reason: "stream unavailable".into(),
        })
    }
}
