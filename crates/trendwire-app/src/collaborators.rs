//! Offline collaborators backed by local JSON files.
//!
//! The feed file is a JSON array of entries. Each entry is a raw item and
//! may carry a precomputed analysis and embedding, which `ImportedAnalyzer`
//! serves back during the analyze phase.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use trendwire_core::types::{Analysis, Item, RawItem};
use trendwire_insight::types::{Digest, TrendReport};
use trendwire_pipeline::{
    run_blocking_with_timeout, AnalyzerOutput, CollaboratorError, Collector, ContentExtractor,
    DigestSink, SemanticAnalyzer,
};

/// One entry of a JSON feed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    #[serde(flatten)]
    pub item: RawItem,
    #[serde(default)]
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Read and parse a feed file.
pub fn load_feed(path: &Path) -> Result<Vec<FeedEntry>, CollaboratorError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CollaboratorError::InvalidInput(format!("cannot read feed {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        CollaboratorError::InvalidInput(format!("malformed feed {}: {}", path.display(), e))
    })
}

pub struct JsonFeedCollector {
    name: String,
    path: PathBuf,
    timeout: Duration,
}

impl JsonFeedCollector {
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "feed".to_string());
        Self {
            name,
            path,
            timeout,
        }
    }
}

#[async_trait]
impl Collector for JsonFeedCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self) -> Result<Vec<RawItem>, CollaboratorError> {
        let path = self.path.clone();
        let entries = run_blocking_with_timeout(self.timeout, move || load_feed(&path)).await??;
        debug!(feed = %self.path.display(), entries = entries.len(), "Feed loaded");
        Ok(entries.into_iter().map(|e| e.item).collect())
    }
}

/// Serves analyses imported from the feed file.
pub struct ImportedAnalyzer {
    outputs: HashMap<String, AnalyzerOutput>,
}

impl ImportedAnalyzer {
    pub fn from_entries(entries: &[FeedEntry]) -> Self {
        let outputs = entries
            .iter()
            .filter_map(|e| {
                e.analysis.as_ref().map(|analysis| {
                    (
                        e.item.key.clone(),
                        AnalyzerOutput {
                            analysis: analysis.clone(),
                            embedding: e.embedding.clone(),
                        },
                    )
                })
            })
            .collect();
        Self { outputs }
    }

    pub fn imported(&self) -> usize {
        self.outputs.len()
    }
}

#[async_trait]
impl SemanticAnalyzer for ImportedAnalyzer {
    async fn analyze(&self, item: &Item) -> Result<AnalyzerOutput, CollaboratorError> {
        self.outputs.get(&item.key).cloned().ok_or_else(|| {
            CollaboratorError::InvalidInput(format!("no imported analysis for {}", item.key))
        })
    }
}

/// Extractor for offline runs: feed entries must carry their content.
pub struct UnavailableExtractor;

#[async_trait]
impl ContentExtractor for UnavailableExtractor {
    async fn extract(&self, key: &str) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::InvalidInput(format!(
            "content extraction unavailable offline: {}",
            key
        )))
    }
}

/// Writes digests and trend reports as pretty JSON files.
pub struct JsonFileSink {
    out_dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    async fn write_json<T: Serialize + Sync>(
        &self,
        file_name: String,
        value: &T,
    ) -> Result<PathBuf, CollaboratorError> {
        let body = serde_json::to_vec_pretty(value)
            .map_err(|e| CollaboratorError::InvalidInput(e.to_string()))?;
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| CollaboratorError::Other(e.to_string()))?;
        let path = self.out_dir.join(file_name);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| CollaboratorError::Other(e.to_string()))?;
        Ok(path)
    }
}

#[async_trait]
impl DigestSink for JsonFileSink {
    async fn deliver_digest(&self, digest: &Digest) -> Result<(), CollaboratorError> {
        let path = self
            .write_json(format!("digest-{}.json", digest.period), digest)
            .await?;
        info!(path = %path.display(), entries = digest.entries.len(), "Digest written");
        Ok(())
    }

    async fn deliver_trend_report(&self, report: &TrendReport) -> Result<(), CollaboratorError> {
        let path = self
            .write_json(format!("trends-{}.json", report.period), report)
            .await?;
        info!(path = %path.display(), hot_trends = report.hot_trends.len(), "Trend report written");
        Ok(())
    }
}
