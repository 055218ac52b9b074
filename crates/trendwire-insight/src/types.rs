use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trendwire_core::types::Item;

/// Clustering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMethod {
    /// Partitional clustering with adaptive k.
    KMeans,
    /// Density-based clustering; sparse points become noise.
    Dbscan,
}

impl ClusterMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KMeans => "kmeans",
            Self::Dbscan => "dbscan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kmeans" => Some(Self::KMeans),
            "dbscan" => Some(Self::Dbscan),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lightweight reference to an item, used in samples and representatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRef {
    pub key: String,
    pub title: String,
    pub priority: f64,
    pub published_at: DateTime<Utc>,
}

impl From<&Item> for ItemRef {
    fn from(item: &Item) -> Self {
        Self {
            key: item.key.clone(),
            title: item.title.clone(),
            priority: item.priority(),
            published_at: item.published_at,
        }
    }
}

/// A member of a topic cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub item: ItemRef,
    /// Euclidean distance to the cluster centroid.
    pub distance: f64,
}

/// A group of related items. Recomputed on every periodic run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCluster {
    pub id: usize,
    /// Ranked by priority desc, then distance to centroid asc.
    pub members: Vec<ClusterMember>,
    pub centroid: Vec<f64>,
    pub average_priority: f64,
    pub keywords: Vec<String>,
}

impl TopicCluster {
    pub fn article_count(&self) -> usize {
        self.members.len()
    }
}

/// Output of one clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    pub method: ClusterMethod,
    /// Sorted by average priority, highest first.
    pub clusters: Vec<TopicCluster>,
    pub cluster_count: usize,
    /// Silhouette score; only defined for partitional runs with 2+ clusters.
    pub quality_score: Option<f64>,
    /// Cluster id per input row, `None` for noise.
    pub labels: Vec<Option<usize>>,
    pub noise: Vec<String>,
}

/// A cluster that qualifies as a hot trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub cluster_id: usize,
    pub article_count: usize,
    pub average_priority: f64,
    /// `min(article_count / 10, 1) * average_priority`, in `[0, 1]`.
    pub trend_score: f64,
    pub evidence: String,
    pub keywords: Vec<String>,
}

/// How an emerging topic was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergingBasis {
    /// Keyword absent from the previous period.
    Novelty,
    /// No previous period available: rare keyword with high priority.
    LowFrequencyHighPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergingTopic {
    pub keywords: Vec<String>,
    pub article_count: usize,
    pub average_priority: f64,
    pub first_appearance: DateTime<Utc>,
    pub sample_articles: Vec<ItemRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergingReport {
    pub basis: EmergingBasis,
    pub topics: Vec<EmergingTopic>,
}

/// One ranked entry of a curated digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestEntry {
    pub rank: usize,
    pub key: String,
    pub title: String,
    pub summary: String,
    pub category: String,
    pub priority: f64,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
}

/// Curated digest handed to the delivery sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    /// e.g. `2026-03-10` or `2026-03-03_2026-03-10`.
    pub period: String,
    pub generated_at: DateTime<Utc>,
    pub headline: String,
    pub overview: String,
    pub entries: Vec<DigestEntry>,
    pub category_breakdown: BTreeMap<String, usize>,
}

impl Digest {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub keywords: Vec<String>,
    pub article_count: usize,
    pub average_priority: f64,
    pub representatives: Vec<ItemRef>,
}

/// Periodic trend report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub period: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub hot_trends: Vec<Trend>,
    pub emerging: EmergingReport,
    pub clusters: Vec<ClusterSummary>,
    pub cluster_method: Option<ClusterMethod>,
    pub quality_score: Option<f64>,
    /// Why clustering produced nothing, when it failed.
    pub clustering_skipped: Option<String>,
}
