use thiserror::Error;

use crate::types::ItemStatus;

/// Top-level error type for the Trendwire system.
///
/// Subsystem crates define their own error types and implement
/// `From<TrendwireError>` (or wrap it) so that the `?` operator works across
/// crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrendwireError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: ItemStatus, to: ItemStatus },

    #[error("Embedding dimension mismatch for model {model}: expected {expected}, got {actual}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for TrendwireError {
    fn from(err: toml::de::Error) -> Self {
        TrendwireError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TrendwireError {
    fn from(err: toml::ser::Error) -> Self {
        TrendwireError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TrendwireError {
    fn from(err: serde_json::Error) -> Self {
        TrendwireError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Trendwire operations.
pub type Result<T> = std::result::Result<T, TrendwireError>;
