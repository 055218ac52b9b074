use thiserror::Error;

/// Structured failure of a clustering run.
///
/// Returned as a value so the caller can degrade (skip trend scoring for the
/// run) instead of aborting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusteringError {
    #[error("insufficient data: {n} embedded items, need at least {min}")]
    InsufficientData { n: usize, min: usize },
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("unknown clustering method: {0}")]
    UnknownMethod(String),
}

/// Errors that can occur while building insight components.
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("config error: {0}")]
    Config(String),
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}
