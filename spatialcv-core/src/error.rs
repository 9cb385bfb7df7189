//! Error types for the spatialcv-core crate.

use thiserror::Error;

/// Top-level error type for spatial cross-validation.
#[derive(Debug, Error)]
pub enum CvError {
    /// Invalid fold count, buffer distance, or other run parameter.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A fold would have an empty training or test set.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Fitting a model on one fold's training set failed. Non-fatal for a run.
    #[error("Fit failure: {0}")]
    FitFailure(String),

    /// Scoring one fold's predictions failed. Non-fatal for a run.
    #[error("Scoring failure: {0}")]
    ScoringFailure(String),

    /// No valid fold assignment could be produced. Aborts the run.
    #[error("Partition failure: {0}")]
    PartitionFailure(String),

    /// Every fold (or every repetition) failed, so nothing can be aggregated.
    #[error("Aggregate failure: {0}")]
    AggregateFailure(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Config loading error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl CvError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    pub fn fit(msg: impl Into<String>) -> Self {
        Self::FitFailure(msg.into())
    }

    pub fn scoring(msg: impl Into<String>) -> Self {
        Self::ScoringFailure(msg.into())
    }

    pub fn partition(msg: impl Into<String>) -> Self {
        Self::PartitionFailure(msg.into())
    }

    pub fn aggregate(msg: impl Into<String>) -> Self {
        Self::AggregateFailure(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    /// Errors that another seed cannot fix: bad settings, too little data,
    /// or a cancelled run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::InsufficientData(_) | Self::Cancelled
        )
    }
}
