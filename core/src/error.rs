use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid schedule: {0}")]
    Schedule(#[from] cron::error::Error),

    #[error("Sink transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Artifact '{name}' is invalid: {reason}")]
    InvalidArtifact { name: String, reason: String },

    #[error("Duplicate column '{column}' in fetched rows")]
    DuplicateColumn { column: String },

    #[error("Row {row} has {actual} values, header declares {expected}")]
    RowWidthMismatch { row: usize, expected: usize, actual: usize },

    #[error("Feature columns do not match scaler columns")]
    ScalerMismatch,

    #[error("Sink '{sink}' rejected batch for '{destination}': {reason}")]
    SinkRejected { sink: String, destination: String, reason: String },

    #[error("Pipeline '{name}' not configured")]
    PipelineNotFound { name: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ScoringResult<T> = Result<T, ScoringError>;
