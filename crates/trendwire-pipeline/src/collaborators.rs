//! Collaborator traits the orchestrator drives.
//!
//! Fetching, extraction, semantic analysis and delivery live outside the
//! core; the orchestrator only sees these async traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use trendwire_core::types::{Analysis, Item, RawItem};
use trendwire_insight::types::{Digest, TrendReport};

use crate::error::CollaboratorError;

/// Source of raw items.
#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    async fn collect(&self) -> Result<Vec<RawItem>, CollaboratorError>;
}

/// Fetches full content for an item by identity key.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, key: &str) -> Result<String, CollaboratorError>;
}

/// Output of one analyzer call. Scores are clamped by the caller before storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerOutput {
    pub analysis: Analysis,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Semantic analysis and embedding of a single item.
#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
    async fn analyze(&self, item: &Item) -> Result<AnalyzerOutput, CollaboratorError>;
}

/// Renders and sends curated output.
#[async_trait]
pub trait DigestSink: Send + Sync {
    async fn deliver_digest(&self, digest: &Digest) -> Result<(), CollaboratorError>;

    async fn deliver_trend_report(&self, report: &TrendReport) -> Result<(), CollaboratorError>;
}
