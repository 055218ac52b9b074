//! Trendwire Insight crate - deduplication, clustering, trend scoring and reports.
//!
//! Provides the analytical core of the pipeline:
//! - Keyword-overlap deduplication of curated items
//! - Vector clustering of item embeddings (k-means with adaptive k, DBSCAN)
//! - TF-IDF keywords per cluster
//! - Hot trend ranking and emerging topic detection
//! - Digest and trend report assembly

pub mod cluster;
pub mod dedup;
pub mod digest;
pub mod error;
pub mod keywords;
pub mod trend;
pub mod types;

pub use cluster::{select_k, VectorClusterer};
pub use dedup::Deduplicator;
pub use digest::{DigestBuilder, ReportWindow, TrendReportBuilder};
pub use error::{ClusteringError, InsightError};
pub use trend::TrendScorer;
pub use types::{
    ClusterMethod, ClusterSummary, ClusteringResult, Digest, DigestEntry, EmergingBasis,
    EmergingReport, EmergingTopic, ItemRef, TopicCluster, Trend, TrendReport,
};
