use thiserror::Error;

/// Per-record normalization failure. Recoverable: the record is skipped
/// and counted, the batch continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("field '{field}' has invalid value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("record is not a JSON object")]
    NotAnObject,
}

#[derive(Error, Debug)]
pub enum AmlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Profile '{profile}' could not evaluate: {reason}")]
    ProfileEvaluation { profile: &'static str, reason: String },

    #[error("Batch {batch_id} exceeded its {timeout_secs}s timeout")]
    BatchTimeout { batch_id: u64, timeout_secs: u64 },

    #[error("Worker failed on batch {batch_id}: {detail}")]
    WorkerFailure { batch_id: u64, detail: String },

    #[error("Persistence failed after {attempts} attempts: {detail}")]
    Persistence { attempts: u32, detail: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AmlResult<T> = Result<T, AmlError>;
