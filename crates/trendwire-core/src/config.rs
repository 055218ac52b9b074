use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TrendwireError};

/// Top-level configuration for Trendwire.
///
/// Loaded from `~/.trendwire/config.toml` by default. Each section
/// corresponds to one pipeline component or a cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendwireConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub curation: CurationConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub trends: TrendConfig,
}

impl TrendwireConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TrendwireConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TrendwireError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database and rendered reports.
    pub data_dir: String,
    /// Database file name inside `data_dir`.
    pub database_file: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.trendwire/data".to_string(),
            database_file: "trendwire.db".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Phase orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum analyzer calls in flight during the analyze phase.
    pub analyze_concurrency: usize,
    /// Maximum number of collected items analyzed per run.
    pub analyze_batch_limit: usize,
    /// Upper bound for a single analyzer call, in seconds.
    pub analyze_timeout_secs: u64,
    /// Model name under which analyzer embeddings are stored.
    pub embedding_model: String,
    /// Look-back window of a daily run, in hours.
    pub daily_window_hours: i64,
    /// Look-back window of a periodic (trend) run, in days.
    pub periodic_window_days: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analyze_concurrency: 5,
            analyze_batch_limit: 200,
            analyze_timeout_secs: 120,
            embedding_model: "text-embedding-3-small".to_string(),
            daily_window_hours: 24,
            periodic_window_days: 7,
        }
    }
}

/// Exponential backoff settings for collaborator calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

/// A substring whose presence adds weighted pseudo-keywords to an item's
/// keyword set during deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMarker {
    pub term: String,
    #[serde(default = "default_marker_weight")]
    pub weight: u8,
}

fn default_marker_weight() -> u8 {
    1
}

impl DomainMarker {
    pub fn new(term: &str, weight: u8) -> Self {
        Self {
            term: term.to_string(),
            weight,
        }
    }
}

/// Near-duplicate detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Jaccard similarity above which a candidate is a duplicate.
    pub similarity_threshold: f64,
    /// Number of summary characters included in the keyword set.
    pub summary_prefix_chars: usize,
    pub markers: Vec<DomainMarker>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.35,
            summary_prefix_chars: 150,
            markers: default_domain_markers(),
        }
    }
}

/// Domain markers used when no `[[dedup.markers]]` are configured.
pub fn default_domain_markers() -> Vec<DomainMarker> {
    vec![
        DomainMarker::new("openai", 2),
        DomainMarker::new("anthropic", 2),
        DomainMarker::new("deepmind", 2),
        DomainMarker::new("gpt", 2),
        DomainMarker::new("claude", 2),
        DomainMarker::new("gemini", 2),
        DomainMarker::new("llama", 2),
        DomainMarker::new("nvidia", 1),
        DomainMarker::new("开源", 1),
        DomainMarker::new("发布", 1),
        DomainMarker::new("融资", 1),
    ]
}

/// Rule rejecting titles that look garbled (mojibake, markup residue).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GarbledTitleConfig {
    /// Titles with fewer visible characters are rejected.
    pub min_visible_chars: usize,
    /// Maximum share of replacement, control or symbol characters.
    pub max_noise_ratio: f64,
}

impl Default for GarbledTitleConfig {
    fn default() -> Self {
        Self {
            min_visible_chars: 6,
            max_noise_ratio: 0.3,
        }
    }
}

/// Curate phase settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    /// Top-by-priority candidates considered before deduplication.
    pub candidate_pool: usize,
    /// Maximum items in a delivered digest.
    pub max_items: usize,
    /// Items below this priority never enter a digest.
    pub min_priority: f64,
    #[serde(default)]
    pub garbled_title: GarbledTitleConfig,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            candidate_pool: 50,
            max_items: 10,
            min_priority: 0.0,
            garbled_title: GarbledTitleConfig::default(),
        }
    }
}

/// One row of the article-count → k table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KThreshold {
    pub min_articles: usize,
    pub k: usize,
}

/// Vector clustering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// `kmeans` or `dbscan`.
    pub method: String,
    /// Checked in descending `min_articles` order; below every row k is `fallback_k`.
    pub k_thresholds: Vec<KThreshold>,
    pub fallback_k: usize,
    pub restarts: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
    /// Neighborhood radius for `dbscan`.
    pub eps: f64,
    /// Minimum neighborhood size (self included) for a `dbscan` core point.
    pub min_samples: usize,
    pub keywords_per_cluster: usize,
    /// Representative items listed per cluster in reports.
    pub representatives_per_cluster: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            method: "kmeans".to_string(),
            k_thresholds: vec![
                KThreshold { min_articles: 40, k: 5 },
                KThreshold { min_articles: 25, k: 4 },
                KThreshold { min_articles: 15, k: 3 },
            ],
            fallback_k: 2,
            restarts: 10,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: 42,
            eps: 0.5,
            min_samples: 3,
            keywords_per_cluster: 5,
            representatives_per_cluster: 3,
        }
    }
}

/// Trend scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub min_article_count: usize,
    pub min_avg_priority: f64,
    pub emerging_min_priority: f64,
    pub emerging_min_count: usize,
    /// Without a previous period, keywords seen more often than this are not emerging.
    pub fallback_max_count: usize,
    pub sample_size: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_article_count: 5,
            min_avg_priority: 0.75,
            emerging_min_priority: 0.7,
            emerging_min_count: 2,
            fallback_max_count: 5,
            sample_size: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = TrendwireConfig::default();
        assert_eq!(config.general.data_dir, "~/.trendwire/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.pipeline.analyze_concurrency, 5);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.dedup.similarity_threshold, 0.35);
        assert_eq!(config.dedup.summary_prefix_chars, 150);
        assert_eq!(config.clustering.method, "kmeans");
        assert_eq!(config.clustering.k_thresholds.len(), 3);
        assert_eq!(config.trends.min_article_count, 5);
        assert_eq!(config.trends.min_avg_priority, 0.75);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
data_dir = "/custom/data"
log_level = "debug"

[dedup]
similarity_threshold = 0.5
summary_prefix_chars = 100

[[dedup.markers]]
term = "rust"
weight = 3

[clustering]
method = "dbscan"
eps = 0.8

[[clustering.k_thresholds]]
min_articles = 10
k = 3
"#;
        let file = create_temp_config(content);
        let config = TrendwireConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "/custom/data");
        assert_eq!(config.dedup.similarity_threshold, 0.5);
        assert_eq!(config.dedup.markers, vec![DomainMarker::new("rust", 3)]);
        assert_eq!(config.clustering.method, "dbscan");
        assert_eq!(config.clustering.eps, 0.8);
        assert_eq!(
            config.clustering.k_thresholds,
            vec![KThreshold { min_articles: 10, k: 3 }]
        );
        // Untouched fields keep their defaults.
        assert_eq!(config.clustering.min_samples, 3);
    }

    #[test]
    fn test_marker_weight_defaults_to_one() {
        let content = r#"
[[dedup.markers]]
term = "wasm"
"#;
        let file = create_temp_config(content);
        let config = TrendwireConfig::load(file.path()).unwrap();
        assert_eq!(config.dedup.markers[0].weight, 1);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[trends]
min_article_count = 8
"#;
        let file = create_temp_config(content);
        let config = TrendwireConfig::load(file.path()).unwrap();
        assert_eq!(config.trends.min_article_count, 8);
        assert_eq!(config.trends.min_avg_priority, 0.75);
        assert_eq!(config.curation.max_items, 10);
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let file = create_temp_config("[general\nlog_level = ");
        assert!(matches!(
            TrendwireConfig::load(file.path()),
            Err(TrendwireError::Config(_))
        ));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = TrendwireConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.trendwire/data");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = TrendwireConfig::default();
        config.curation.max_items = 7;
        config.save(&path).unwrap();

        let reloaded = TrendwireConfig::load(&path).unwrap();
        assert_eq!(reloaded.curation.max_items, 7);
        assert_eq!(reloaded.dedup.markers, config.dedup.markers);
        assert_eq!(reloaded.clustering.k_thresholds, config.clustering.k_thresholds);
    }
}
