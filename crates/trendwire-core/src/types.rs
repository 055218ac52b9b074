use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrendwireError;

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle status of a stored item.
///
/// Status only advances: `Collected -> Analyzed | ExtractionFailed`, then
/// `Analyzed -> Reported`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Stored by the collect phase, not yet analyzed.
    Collected,
    /// Semantic analysis (and possibly an embedding) has been recorded.
    Analyzed,
    /// Content could not be extracted; the item is never analyzed.
    ExtractionFailed,
    /// Included in a delivered digest. Terminal.
    Reported,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collected => "collected",
            Self::Analyzed => "analyzed",
            Self::ExtractionFailed => "extraction_failed",
            Self::Reported => "reported",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "collected" => Some(Self::Collected),
            "analyzed" => Some(Self::Analyzed),
            "extraction_failed" => Some(Self::ExtractionFailed),
            "reported" => Some(Self::Reported),
            _ => None,
        }
    }

    /// Whether moving from `self` to `to` is a legal status advance.
    pub fn can_transition_to(&self, to: ItemStatus) -> bool {
        matches!(
            (self, to),
            (Self::Collected, Self::Analyzed)
                | (Self::Collected, Self::ExtractionFailed)
                | (Self::Analyzed, Self::Reported)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a status transition.
pub fn validate_transition(from: ItemStatus, to: ItemStatus) -> Result<(), TrendwireError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TrendwireError::InvalidTransition { from, to })
    }
}

// =============================================================================
// Items
// =============================================================================

/// An item as produced by a collector, before it is stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Identity key, usually the canonical URL.
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    /// Kind of source, e.g. `rss` or `search`.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A stored content item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: String,
    pub title: String,
    pub content: Option<String>,
    pub status: ItemStatus,
    pub source: String,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub collected_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,

    // Analysis fields, populated when the item reaches `Analyzed`.
    pub summary: Option<String>,
    pub key_insights: Vec<String>,
    pub category: Option<String>,
    pub relevance_score: Option<f64>,
    pub priority_score: Option<f64>,
    pub reasoning: Option<String>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Build a freshly collected item from collector output.
    pub fn from_raw(raw: RawItem, collected_at: DateTime<Utc>) -> Self {
        Self {
            key: raw.key,
            title: raw.title,
            content: raw.content.filter(|c| !c.trim().is_empty()),
            status: ItemStatus::Collected,
            source: raw.source,
            source_name: raw.source_name,
            published_at: raw.published_at,
            collected_at,
            tags: raw.tags.into_iter().collect(),
            summary: None,
            key_insights: Vec::new(),
            category: None,
            relevance_score: None,
            priority_score: None,
            reasoning: None,
            analyzed_at: None,
        }
    }

    /// Priority score, treating a missing score as zero.
    pub fn priority(&self) -> f64 {
        self.priority_score.unwrap_or(0.0)
    }

    /// Summary text, or the empty string before analysis.
    pub fn summary_text(&self) -> &str {
        self.summary.as_deref().unwrap_or("")
    }

    /// Title and summary joined by a space.
    pub fn title_and_summary(&self) -> String {
        match self.summary.as_deref() {
            Some(s) if !s.is_empty() => format!("{} {}", self.title, s),
            _ => self.title.clone(),
        }
    }
}

/// Semantic analysis of an item, as produced by the analyzer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub summary: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub category: String,
    pub relevance_score: f64,
    pub priority_score: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Analysis {
    /// Return a copy with both scores clamped into `[0, 1]`.
    pub fn clamped(&self) -> Self {
        Self {
            relevance_score: clamp_unit(self.relevance_score),
            priority_score: clamp_unit(self.priority_score),
            ..self.clone()
        }
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// An embedding vector owned by one item, for one model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub item_key: String,
    pub model: String,
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(item_key: impl Into<String>, model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            item_key: item_key.into(),
            model: model.into(),
            vector,
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}
