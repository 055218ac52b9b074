//! Digest and trend report generation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use trendwire_core::types::Item;

use crate::error::ClusteringError;
use crate::types::{
    ClusterSummary, ClusteringResult, Digest, DigestEntry, EmergingReport, ItemRef, Trend,
    TrendReport,
};

const UNCATEGORIZED: &str = "uncategorized";

/// Builds curated digests from deduplicated, priority-ordered items.
pub struct DigestBuilder;

impl DigestBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a digest for `period` from the curated items, in delivery order.
    pub fn build(&self, period: &str, items: &[Item], generated_at: DateTime<Utc>) -> Digest {
        let category_breakdown: BTreeMap<String, usize> =
            items.iter().fold(BTreeMap::new(), |mut acc, item| {
                *acc.entry(category_of(item).to_string()).or_insert(0) += 1;
                acc
            });

        let headline = items
            .first()
            .map(|i| i.title.clone())
            .unwrap_or_else(|| "No items selected".to_string());

        let overview = {
            let mut ranked: Vec<(&String, &usize)> = category_breakdown.iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            let parts: Vec<String> = ranked
                .iter()
                .map(|(cat, count)| format!("{} ({})", cat, count))
                .collect();
            format!(
                "{} {} across {} {}: {}",
                items.len(),
                if items.len() == 1 { "item" } else { "items" },
                category_breakdown.len(),
                if category_breakdown.len() == 1 {
                    "category"
                } else {
                    "categories"
                },
                parts.join(", ")
            )
        };

        let entries = items
            .iter()
            .enumerate()
            .map(|(i, item)| DigestEntry {
                rank: i + 1,
                key: item.key.clone(),
                title: item.title.clone(),
                summary: item.summary_text().to_string(),
                category: category_of(item).to_string(),
                priority: item.priority(),
                source_name: item.source_name.clone(),
                published_at: item.published_at,
            })
            .collect();

        Digest {
            period: period.to_string(),
            generated_at,
            headline,
            overview,
            entries,
            category_breakdown,
        }
    }
}

impl Default for DigestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn category_of(item: &Item) -> &str {
    match item.category.as_deref() {
        Some(c) if !c.trim().is_empty() => c,
        _ => UNCATEGORIZED,
    }
}

/// Window covered by a periodic report.
#[derive(Debug, Clone)]
pub struct ReportWindow {
    pub period: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// Assembles the periodic trend report.
pub struct TrendReportBuilder {
    representatives: usize,
}

impl TrendReportBuilder {
    pub fn new(representatives: usize) -> Self {
        Self { representatives }
    }

    pub fn build(
        &self,
        window: ReportWindow,
        clustering: Result<&ClusteringResult, &ClusteringError>,
        hot_trends: Vec<Trend>,
        emerging: EmergingReport,
        generated_at: DateTime<Utc>,
    ) -> TrendReport {
        let (clusters, cluster_method, quality_score, clustering_skipped) = match clustering {
            Ok(result) => (
                result
                    .clusters
                    .iter()
                    .map(|c| ClusterSummary {
                        cluster_id: c.id,
                        keywords: c.keywords.clone(),
                        article_count: c.article_count(),
                        average_priority: c.average_priority,
                        representatives: c
                            .members
                            .iter()
                            .take(self.representatives)
                            .map(|m| m.item.clone())
                            .collect::<Vec<ItemRef>>(),
                    })
                    .collect(),
                Some(result.method),
                result.quality_score,
                None,
            ),
            Err(e) => (Vec::new(), None, None, Some(e.to_string())),
        };

        TrendReport {
            period: window.period,
            since: window.since,
            until: window.until,
            generated_at,
            hot_trends,
            emerging,
            clusters,
            cluster_method,
            quality_score,
            clustering_skipped,
        }
    }
}
