//! Error types for Spendcast

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data types: {0}")]
    InsufficientDataTypes(String),

    #[error("Insufficient sequential data: {0}")]
    InsufficientSequentialData(String),

    #[error("Insufficient training data: {0}")]
    InsufficientTrainingData(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Training timed out after {elapsed_secs:.1}s")]
    TrainingTimeout { elapsed_secs: f64 },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Not-enough-data conditions: the caller may try again once more
    /// transactions have been ingested.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            Error::InsufficientDataTypes(_)
                | Error::InsufficientSequentialData(_)
                | Error::InsufficientTrainingData(_)
        )
    }

    /// Failures caused by artifact reads or writes
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::StorageUnavailable(_) | Error::Io(_) | Error::Json(_) | Error::Csv(_)
        )
    }

    /// Whether retrying the same call later can succeed
    pub fn is_retryable(&self) -> bool {
        self.is_not_ready() || self.is_storage() || matches!(self, Error::TrainingTimeout { .. })
    }

    /// Stable snake_case name for logs and API responses
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::InsufficientDataTypes(_) => "insufficient_data_types",
            Error::InsufficientSequentialData(_) => "insufficient_sequential_data",
            Error::InsufficientTrainingData(_) => "insufficient_training_data",
            Error::TrainingTimeout { .. } => "training_timeout",
            Error::Training(_) => "training",
            Error::Model(_) => "model",
            Error::Config(_) => "config",
            Error::StorageUnavailable(_) | Error::Io(_) | Error::Json(_) | Error::Csv(_) => {
                "storage_unavailable"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
