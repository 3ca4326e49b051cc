//! Events forwarded to the downstream stream after a run commits.

use crate::types::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scored source row as published to the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEvent {
    pub run_id: RunId,
    pub pipeline: String,
    pub key: serde_json::Value,
    pub base_scores: [f64; 2],
    pub verdict: u8,
    /// Probability (churn) or raw meta output (fraud) the verdict came from.
    pub score: f64,
    pub threshold: f64,
    pub scored_at: DateTime<Utc>,
    /// The source row exactly as fetched.
    pub record: serde_json::Map<String, serde_json::Value>,
}
