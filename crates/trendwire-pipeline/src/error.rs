//! Error types for the pipeline.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state_machine::PipelineState;

/// Error returned by an external collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// Programmer errors: wrong type, value, key or attribute.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The worker running the call panicked or was cancelled.
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
    #[error("{0}")]
    Other(String),
}

/// Failure of a time-boxed call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("Operation timed out after {0:?}")]
    Elapsed(Duration),
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

impl From<TimeoutError> for CollaboratorError {
    fn from(e: TimeoutError) -> Self {
        match e {
            TimeoutError::Elapsed(_) => CollaboratorError::Timeout(e.to_string()),
            TimeoutError::WorkerFailed(msg) => CollaboratorError::WorkerFailed(msg),
        }
    }
}

/// Illegal move of the run-level phase machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid phase transition: {from} -> {to}")]
pub struct PhaseTransitionError {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// Category of a recorded pipeline error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Phase-fatal: the collector failed.
    Collection,
    /// Item-local: a collected item was unusable, e.g. had no identity key.
    InvalidItem,
    /// Item-local: content could not be extracted.
    Extraction,
    /// Item-local: the analyzer failed for one item.
    Analysis,
    Storage,
    /// Phase-local: a digest or report could not be delivered.
    Delivery,
    /// Clustering produced no result; trend scoring was skipped.
    Clustering,
    /// A panic or other unclassified failure.
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::InvalidItem => "invalid_item",
            Self::Extraction => "extraction",
            Self::Analysis => "analysis",
            Self::Storage => "storage",
            Self::Delivery => "delivery",
            Self::Clustering => "clustering",
            Self::Unexpected => "unexpected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a run's ordered error list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineError {
    pub phase: PipelineState,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_key: Option<String>,
    pub timestamp: DateTime<Utc>,
}
