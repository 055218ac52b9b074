//! Hot-trend ranking and emerging-topic detection.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{info, warn, Span};

use trendwire_core::config::TrendConfig;
use trendwire_core::types::Item;

use crate::error::InsightError;
use crate::keywords::is_stop_word;
use crate::types::{EmergingBasis, EmergingReport, EmergingTopic, ItemRef, TopicCluster, Trend};

/// Summary characters scanned for emerging keywords.
const SUMMARY_SCAN_CHARS: usize = 200;

/// Articles at which the volume factor of a trend score saturates.
const SATURATION_COUNT: f64 = 10.0;

/// Rounding slack when comparing averaged scores against thresholds.
const SCORE_EPSILON: f64 = 1e-9;

/// `value >= threshold`, tolerating rounding error from averaging scores.
pub fn meets_threshold(value: f64, threshold: f64) -> bool {
    value + SCORE_EPSILON >= threshold
}

/// Per-keyword statistics over one period.
#[derive(Debug, Default)]
struct KeywordStats {
    count: usize,
    priority_sum: f64,
    first_appearance: Option<DateTime<Utc>>,
    items: Vec<usize>,
}

impl KeywordStats {
    fn average_priority(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.priority_sum / self.count as f64
        }
    }
}

/// Scores clusters as hot trends and finds emerging keywords.
pub struct TrendScorer {
    config: TrendConfig,
    token: Regex,
    span: Span,
}

impl TrendScorer {
    pub fn new(config: TrendConfig) -> Result<Self, InsightError> {
        Ok(Self {
            config,
            token: Regex::new(r"[A-Za-z]{4,}")?,
            span: Span::none(),
        })
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Clusters with enough articles and a high enough average priority,
    /// sorted by trend score descending.
    pub fn identify_hot_trends(&self, clusters: &[TopicCluster]) -> Vec<Trend> {
        let mut trends: Vec<Trend> = clusters
            .iter()
            .filter(|c| {
                c.article_count() >= self.config.min_article_count
                    && meets_threshold(c.average_priority, self.config.min_avg_priority)
            })
            .map(|c| {
                let count = c.article_count();
                Trend {
                    cluster_id: c.id,
                    article_count: count,
                    average_priority: c.average_priority,
                    trend_score: trend_score(count, c.average_priority),
                    evidence: format!("{} articles, avg priority {:.2}", count, c.average_priority),
                    keywords: c.keywords.clone(),
                }
            })
            .collect();

        trends.sort_by(|a, b| {
            b.trend_score
                .total_cmp(&a.trend_score)
                .then_with(|| b.article_count.cmp(&a.article_count))
                .then_with(|| a.cluster_id.cmp(&b.cluster_id))
        });

        info!(
            parent: &self.span,
            clusters = clusters.len(),
            hot_trends = trends.len(),
            "Hot trends identified"
        );
        trends
    }

    /// Keywords that newly appear in `current` relative to `previous`.
    ///
    /// Without a previous period the detector falls back to rare keywords with
    /// high average priority, and the report's basis says so.
    pub fn detect_emerging_topics(
        &self,
        current: &[Item],
        previous: Option<&[Item]>,
    ) -> EmergingReport {
        let current_stats = self.keyword_stats(current);

        let (basis, candidates): (EmergingBasis, Vec<&String>) = match previous {
            Some(previous) => {
                let previous_stats = self.keyword_stats(previous);
                let novel = current_stats
                    .keys()
                    .filter(|k| !previous_stats.contains_key(*k))
                    .collect();
                (EmergingBasis::Novelty, novel)
            }
            None => {
                warn!(
                    parent: &self.span,
                    basis = "low_frequency_high_priority",
                    "No previous period available; emerging topics use the low-frequency high-priority heuristic"
                );
                let rare = current_stats
                    .iter()
                    .filter(|(_, s)| {
                        s.count <= self.config.fallback_max_count
                            && meets_threshold(s.average_priority(), self.config.emerging_min_priority)
                    })
                    .map(|(k, _)| k)
                    .collect();
                (EmergingBasis::LowFrequencyHighPriority, rare)
            }
        };

        let mut topics: Vec<EmergingTopic> = candidates
            .into_iter()
            .filter_map(|keyword| {
                let stats = current_stats.get(keyword)?;
                let average_priority = stats.average_priority();
                if !meets_threshold(average_priority, self.config.emerging_min_priority)
                    || stats.count < self.config.emerging_min_count
                {
                    return None;
                }

                let mut samples: Vec<&Item> = stats.items.iter().map(|&i| &current[i]).collect();
                samples.sort_by(|a, b| {
                    b.priority()
                        .total_cmp(&a.priority())
                        .then_with(|| b.published_at.cmp(&a.published_at))
                        .then_with(|| a.key.cmp(&b.key))
                });

                Some(EmergingTopic {
                    keywords: vec![keyword.clone()],
                    article_count: stats.count,
                    average_priority,
                    first_appearance: stats.first_appearance?,
                    sample_articles: samples
                        .into_iter()
                        .take(self.config.sample_size)
                        .map(ItemRef::from)
                        .collect(),
                })
            })
            .collect();

        topics.sort_by(|a, b| {
            b.average_priority
                .total_cmp(&a.average_priority)
                .then_with(|| b.article_count.cmp(&a.article_count))
                .then_with(|| a.keywords.cmp(&b.keywords))
        });

        info!(
            parent: &self.span,
            basis = ?basis,
            items = current.len(),
            topics = topics.len(),
            "Emerging topics detected"
        );
        EmergingReport { basis, topics }
    }

    /// Distinct keywords of one item: 4+ letter Latin tokens from the title,
    /// tags and a summary prefix, lower-cased, stop words removed.
    pub fn item_keywords(&self, item: &Item) -> BTreeSet<String> {
        let summary: String = item.summary_text().chars().take(SUMMARY_SCAN_CHARS).collect();
        let tags = item.tags.iter().cloned().collect::<Vec<_>>().join(" ");
        let text = format!("{} {} {}", item.title, tags, summary);

        self.token
            .find_iter(&text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|t| !is_stop_word(t) && !EMERGING_STOP_WORDS.contains(&t.as_str()))
            .collect()
    }

    fn keyword_stats(&self, items: &[Item]) -> BTreeMap<String, KeywordStats> {
        let mut stats: BTreeMap<String, KeywordStats> = BTreeMap::new();
        for (i, item) in items.iter().enumerate() {
            for keyword in self.item_keywords(item) {
                let entry = stats.entry(keyword).or_default();
                entry.count += 1;
                entry.priority_sum += item.priority();
                entry.first_appearance = Some(match entry.first_appearance {
                    Some(t) if t <= item.published_at => t,
                    _ => item.published_at,
                });
                entry.items.push(i);
            }
        }
        stats
    }
}

/// News filler words that carry no topic on their own.
const EMERGING_STOP_WORDS: &[&str] = &[
    "announce", "announced", "announces", "article", "company", "launch", "launched", "launches",
    "news", "release", "released", "releases", "report", "reports", "says", "today", "update",
    "updates", "week", "year",
];

/// `min(article_count / 10, 1) * average_priority`.
pub fn trend_score(article_count: usize, average_priority: f64) -> f64 {
    (article_count as f64 / SATURATION_COUNT).min(1.0) * average_priority
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use trendwire_core::types::{ItemStatus, RawItem};

    fn scorer() -> TrendScorer {
        TrendScorer::new(TrendConfig::default()).unwrap()
    }

    fn cluster(id: usize, count: usize, avg: f64) -> TopicCluster {
        use crate::types::ClusterMember;
        let members = (0..count)
            .map(|i| ClusterMember {
                item: ItemRef {
                    key: format!("c{}-{}", id, i),
                    title: "t".to_string(),
                    priority: avg,
                    published_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
                },
                distance: 0.0,
            })
            .collect();
        TopicCluster {
            id,
            members,
            centroid: vec![0.0],
            average_priority: avg,
            keywords: vec![format!("kw{}", id)],
        }
    }

    fn item(key: &str, title: &str, priority: f64, day: u32) -> Item {
        let mut item = Item::from_raw(
            RawItem {
                key: key.to_string(),
                title: title.to_string(),
                content: None,
                source: "rss".to_string(),
                source_name: "test".to_string(),
                published_at: Utc.with_ymd_and_hms(2026, 3, day, 8, 0, 0).unwrap(),
                tags: vec![],
            },
            Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap(),
        );
        item.status = ItemStatus::Analyzed;
        item.priority_score = Some(priority);
        item
    }

    #[test]
    fn test_hot_trend_scenario() {
        let trends = scorer().identify_hot_trends(&[cluster(0, 12, 0.87)]);
        assert_eq!(trends.len(), 1);
        assert!((trends[0].trend_score - 0.87).abs() < 1e-9);
        assert_eq!(trends[0].evidence, "12 articles, avg priority 0.87");
        assert_eq!(trends[0].keywords, vec!["kw0".to_string()]);
    }

    #[test]
    fn test_hot_trends_filtered_and_sorted() {
        let clusters = vec![
            cluster(0, 4, 0.95),  // too few articles
            cluster(1, 6, 0.80),  // 0.48
            cluster(2, 20, 0.76), // 0.76
            cluster(3, 30, 0.70), // priority too low
            cluster(4, 10, 0.90), // 0.90
        ];
        let trends = scorer().identify_hot_trends(&clusters);
        let ids: Vec<usize> = trends.iter().map(|t| t.cluster_id).collect();
        assert_eq!(ids, vec![4, 2, 1]);
        for pair in trends.windows(2) {
            assert!(pair[0].trend_score >= pair[1].trend_score);
        }
        for t in &trends {
            assert!(t.article_count >= 5 && t.average_priority >= 0.75);
            assert!((0.0..=1.0).contains(&t.trend_score));
        }
    }

    #[test]
    fn test_trend_score_saturates() {
        assert!((trend_score(5, 0.8) - 0.4).abs() < 1e-12);
        assert!((trend_score(25, 0.8) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_item_keywords_dedup_and_filtering() {
        let mut it = item("k", "Quantum quantum chip with the Photonics", 0.9, 1);
        it.tags.insert("lidar".to_string());
        it.summary = Some(format!("{} tailword", "x ".repeat(150)));
        let kws = scorer().item_keywords(&it);
        let expected: BTreeSet<String> = ["quantum", "photonics", "lidar"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        // "chip" is 4 letters, "with" is a stop word, "tailword" lies past the scan window.
        assert!(kws.contains("chip"));
        assert!(!kws.contains("with"));
        assert!(!kws.contains("tailword"));
        assert!(expected.is_subset(&kws));
    }

    #[test]
    fn test_emerging_novelty_against_previous_period() {
        let previous = vec![
            item("p1", "Robotics warehouse", 0.9, 1),
            item("p2", "Robotics arms", 0.9, 2),
        ];
        let current = vec![
            item("c1", "Robotics photonics", 0.9, 5),
            item("c2", "Photonics chips", 0.8, 4),
            item("c3", "Photonics startup", 0.75, 6),
            item("c4", "Robotics again", 0.95, 6),
            item("c5", "Fusion reactor", 0.3, 6),
            item("c6", "Fusion milestone", 0.4, 7),
        ];

        let report = scorer().detect_emerging_topics(&current, Some(previous.as_slice()));
        assert_eq!(report.basis, EmergingBasis::Novelty);
        let keywords: Vec<&str> = report
            .topics
            .iter()
            .map(|t| t.keywords[0].as_str())
            .collect();
        // robotics existed before; fusion is low priority; singletons are dropped.
        assert_eq!(keywords, vec!["photonics"]);

        let topic = &report.topics[0];
        assert_eq!(topic.article_count, 3);
        assert!((topic.average_priority - (0.9 + 0.8 + 0.75) / 3.0).abs() < 1e-6);
        assert_eq!(
            topic.first_appearance,
            Utc.with_ymd_and_hms(2026, 3, 4, 8, 0, 0).unwrap()
        );
        let samples: Vec<&str> = topic.sample_articles.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(samples, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn test_emerging_fallback_without_history() {
        let mut current = Vec::new();
        for i in 0..6 {
            current.push(item(&format!("g{}", i), "Genomics sequencing", 0.9, 3));
        }
        current.push(item("h1", "Hydrogen aviation", 0.85, 4));
        current.push(item("h2", "Hydrogen storage", 0.8, 5));

        let report = scorer().detect_emerging_topics(&current, None);
        assert_eq!(report.basis, EmergingBasis::LowFrequencyHighPriority);
        let keywords: Vec<&str> = report
            .topics
            .iter()
            .map(|t| t.keywords[0].as_str())
            .collect();
        // genomics/sequencing appear 6 times: too common for the fallback.
        assert_eq!(keywords, vec!["hydrogen"]);
    }

    #[test]
    fn test_emerging_priority_exactly_at_threshold() {
        let current = vec![
            item("c1", "Photonics chips", 0.7, 4),
            item("c2", "Photonics startup", 0.7, 5),
            item("c3", "Photonics foundry", 0.7, 6),
        ];

        let novelty = scorer().detect_emerging_topics(&current, Some(&[][..]));
        assert_eq!(novelty.topics.len(), 1);
        assert_eq!(novelty.topics[0].keywords, vec!["photonics".to_string()]);
        assert_eq!(novelty.topics[0].article_count, 3);

        let fallback = scorer().detect_emerging_topics(&current, None);
        assert_eq!(fallback.topics.len(), 1);
        assert_eq!(fallback.basis, EmergingBasis::LowFrequencyHighPriority);
    }

    #[test]
    fn test_hot_trend_average_at_configured_threshold() {
        let scorer = TrendScorer::new(TrendConfig {
            min_avg_priority: 0.7,
            ..TrendConfig::default()
        })
        .unwrap();
        // Averaging 0.7 three times lands just below 0.7 in binary floating point.
        let avg = (0.7 + 0.7 + 0.7) / 3.0;
        assert!(avg < 0.7);
        let trends = scorer.identify_hot_trends(&[cluster(0, 6, avg)]);
        assert_eq!(trends.len(), 1);
    }

    #[test]
    fn test_meets_threshold_tolerates_rounding_only() {
        assert!(meets_threshold(0.7, 0.7));
        assert!(meets_threshold(0.6999999999999998, 0.7));
        assert!(!meets_threshold(0.699, 0.7));
    }

    #[test]
    fn test_emerging_sorted_by_priority() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut current = Vec::new();
        for (i, (word, p)) in [("alpha", 0.75), ("bravo", 0.95), ("charlie", 0.85)]
            .iter()
            .enumerate()
        {
            for j in 0..2 {
                let mut it = item(&format!("{}{}", word, j), &format!("{}zz", word), *p, 2);
                it.published_at = start + Duration::hours((i * 2 + j) as i64);
                current.push(it);
            }
        }
        let report = scorer().detect_emerging_topics(&current, Some(&[][..]));
        let keywords: Vec<&str> = report
            .topics
            .iter()
            .map(|t| t.keywords[0].as_str())
            .collect();
        assert_eq!(keywords, vec!["bravozz", "charliezz", "alphazz"]);
        assert_eq!(report.basis, EmergingBasis::Novelty);
    }
}
