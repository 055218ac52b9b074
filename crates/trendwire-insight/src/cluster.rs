//! Topic clustering over item embeddings.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, Span};

use trendwire_core::config::{ClusteringConfig, KThreshold};
use trendwire_core::types::Item;

use crate::error::{ClusteringError, InsightError};
use crate::keywords::{TfIdfModel, Tokenizer};
use crate::types::{ClusterMember, ClusterMethod, ClusteringResult, ItemRef, TopicCluster};

/// Fewest embedded items a clustering run accepts.
pub const MIN_ITEMS: usize = 3;

/// Groups item embeddings into topic clusters.
///
/// Partitional runs pick k from the article count (see [`select_k`]) and keep
/// the best of several k-means++ restarts; density-based runs leave sparse
/// points as noise. Both share cluster assembly: members ranked by priority
/// then distance to centroid, clusters ranked by average priority, and
/// TF-IDF keywords per cluster.
pub struct VectorClusterer {
    config: ClusteringConfig,
    tokenizer: Tokenizer,
    span: Span,
}

/// Per-row labels and centroids produced by one strategy.
struct Partition {
    labels: Vec<Option<usize>>,
    centroids: Vec<Vec<f64>>,
}

struct KMeansFit {
    labels: Vec<usize>,
    centroids: Vec<Vec<f64>>,
    inertia: f64,
}

impl VectorClusterer {
    pub fn new(config: ClusteringConfig) -> Result<Self, InsightError> {
        if config.restarts == 0 {
            return Err(InsightError::Config(
                "clustering.restarts must be at least 1".to_string(),
            ));
        }
        if config.max_iterations == 0 {
            return Err(InsightError::Config(
                "clustering.max_iterations must be at least 1".to_string(),
            ));
        }
        if config.fallback_k < 2 || config.k_thresholds.iter().any(|t| t.k < 2) {
            return Err(InsightError::Config(
                "clustering k values must be at least 2".to_string(),
            ));
        }
        if config.eps.is_nan() || config.eps <= 0.0 {
            return Err(InsightError::Config(format!(
                "clustering.eps must be positive, got {}",
                config.eps
            )));
        }
        if config.min_samples == 0 {
            return Err(InsightError::Config(
                "clustering.min_samples must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            config,
            tokenizer: Tokenizer::new()?,
            span: Span::none(),
        })
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Cluster `embeddings` (one row per entry of `items`) with the configured method.
    pub fn cluster(
        &self,
        embeddings: &[Vec<f32>],
        items: &[Item],
    ) -> Result<ClusteringResult, ClusteringError> {
        let method = ClusterMethod::parse(&self.config.method)
            .ok_or_else(|| ClusteringError::UnknownMethod(self.config.method.clone()))?;
        self.cluster_with(method, embeddings, items)
    }

    pub fn cluster_with(
        &self,
        method: ClusterMethod,
        embeddings: &[Vec<f32>],
        items: &[Item],
    ) -> Result<ClusteringResult, ClusteringError> {
        if embeddings.len() != items.len() {
            return Err(ClusteringError::DimensionMismatch {
                expected: items.len(),
                actual: embeddings.len(),
            });
        }
        let n = embeddings.len();
        if n < MIN_ITEMS {
            return Err(ClusteringError::InsufficientData { n, min: MIN_ITEMS });
        }
        let dim = embeddings[0].len();
        if let Some(row) = embeddings.iter().find(|row| row.len() != dim) {
            return Err(ClusteringError::DimensionMismatch {
                expected: dim,
                actual: row.len(),
            });
        }

        let points: Vec<Vec<f64>> = embeddings
            .iter()
            .map(|row| row.iter().map(|&v| f64::from(v)).collect())
            .collect();

        let (partition, quality_score) = match method {
            ClusterMethod::KMeans => {
                let k = select_k(n, &self.config.k_thresholds, self.config.fallback_k);
                let fit = self.best_kmeans(&points, k);
                let (labels, centroids) = compact_labels(&fit.labels, fit.centroids);
                let cluster_count = centroids.len();
                let quality = if cluster_count >= 2 {
                    Some(silhouette(&points, &labels, cluster_count))
                } else {
                    None
                };
                debug!(
                    parent: &self.span,
                    n, k, cluster_count, inertia = fit.inertia, "k-means finished"
                );
                (
                    Partition {
                        labels: labels.into_iter().map(Some).collect(),
                        centroids,
                    },
                    quality,
                )
            }
            ClusterMethod::Dbscan => {
                let labels = dbscan(&points, self.config.eps, self.config.min_samples);
                let cluster_count = labels.iter().flatten().max().map_or(0, |m| m + 1);
                let centroids = (0..cluster_count)
                    .map(|c| {
                        let members: Vec<&Vec<f64>> = labels
                            .iter()
                            .zip(&points)
                            .filter(|(l, _)| **l == Some(c))
                            .map(|(_, p)| p)
                            .collect();
                        mean(&members, dim)
                    })
                    .collect();
                (Partition { labels, centroids }, None)
            }
        };

        let result = self.assemble(method, &points, items, partition, quality_score);
        info!(
            parent: &self.span,
            method = %method,
            items = n,
            clusters = result.cluster_count,
            noise = result.noise.len(),
            quality = ?result.quality_score,
            "Clustering complete"
        );
        Ok(result)
    }

    fn best_kmeans(&self, points: &[Vec<f64>], k: usize) -> KMeansFit {
        let cfg = &self.config;
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut best = kmeans(points, k, cfg.max_iterations, cfg.tolerance, &mut rng);
        for _ in 1..cfg.restarts {
            let fit = kmeans(points, k, cfg.max_iterations, cfg.tolerance, &mut rng);
            if fit.inertia < best.inertia {
                best = fit;
            }
        }
        best
    }

    fn assemble(
        &self,
        method: ClusterMethod,
        points: &[Vec<f64>],
        items: &[Item],
        partition: Partition,
        quality_score: Option<f64>,
    ) -> ClusteringResult {
        let documents: Vec<String> = items.iter().map(Item::title_and_summary).collect();
        let tfidf = TfIdfModel::fit(&self.tokenizer, &documents);

        let mut clusters: Vec<TopicCluster> = partition
            .centroids
            .into_iter()
            .enumerate()
            .map(|(id, centroid)| {
                let indices: Vec<usize> = partition
                    .labels
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| **l == Some(id))
                    .map(|(i, _)| i)
                    .collect();

                let mut members: Vec<ClusterMember> = indices
                    .iter()
                    .map(|&i| ClusterMember {
                        item: ItemRef::from(&items[i]),
                        distance: euclidean(&points[i], &centroid),
                    })
                    .collect();
                members.sort_by(|a, b| {
                    b.item
                        .priority
                        .total_cmp(&a.item.priority)
                        .then_with(|| a.distance.total_cmp(&b.distance))
                        .then_with(|| a.item.key.cmp(&b.item.key))
                });

                let average_priority = if members.is_empty() {
                    0.0
                } else {
                    members.iter().map(|m| m.item.priority).sum::<f64>()
                        / members.len() as f64
                };

                TopicCluster {
                    id,
                    members,
                    centroid,
                    average_priority,
                    keywords: tfidf.top_terms(&indices, self.config.keywords_per_cluster),
                }
            })
            .collect();

        clusters.sort_by(|a, b| {
            b.average_priority
                .total_cmp(&a.average_priority)
                .then_with(|| b.article_count().cmp(&a.article_count()))
                .then_with(|| a.id.cmp(&b.id))
        });

        let noise = partition
            .labels
            .iter()
            .zip(items)
            .filter(|(l, _)| l.is_none())
            .map(|(_, item)| item.key.clone())
            .collect();

        ClusteringResult {
            method,
            cluster_count: clusters.len(),
            clusters,
            quality_score,
            labels: partition.labels,
            noise,
        }
    }
}

/// Cluster count for `n` articles: the first threshold row (largest
/// `min_articles` first) that `n` reaches, else `fallback`, capped at `n - 1`.
pub fn select_k(n: usize, thresholds: &[KThreshold], fallback: usize) -> usize {
    let mut rows = thresholds.to_vec();
    rows.sort_by(|a, b| b.min_articles.cmp(&a.min_articles));
    let k = rows
        .iter()
        .find(|t| n >= t.min_articles)
        .map_or(fallback, |t| t.k);
    k.min(n.saturating_sub(1)).max(1)
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_distance(a, b).sqrt()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn mean(points: &[&Vec<f64>], dim: usize) -> Vec<f64> {
    let mut acc = vec![0.0; dim];
    for p in points {
        for (a, v) in acc.iter_mut().zip(p.iter()) {
            *a += v;
        }
    }
    if !points.is_empty() {
        let n = points.len() as f64;
        for a in acc.iter_mut() {
            *a /= n;
        }
    }
    acc
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(c, centroid)| (c, squared_distance(point, centroid)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// k-means++ seeding: each next centroid is drawn with probability
/// proportional to its squared distance from the nearest chosen one.
fn seed_centroids(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[rng.random_range(0..points.len())].clone()];
    while centroids.len() < k {
        let weights: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = weights.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if target < *w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        } else {
            rng.random_range(0..points.len())
        };
        centroids.push(points[next].clone());
    }
    centroids
}

fn kmeans(
    points: &[Vec<f64>],
    k: usize,
    max_iterations: usize,
    tolerance: f64,
    rng: &mut StdRng,
) -> KMeansFit {
    let dim = points[0].len();
    let mut centroids = seed_centroids(points, k, rng);
    let mut labels = vec![0usize; points.len()];

    for _ in 0..max_iterations {
        for (label, p) in labels.iter_mut().zip(points) {
            *label = nearest(p, &centroids).0;
        }

        let mut next: Vec<Vec<f64>> = (0..k)
            .map(|c| {
                let members: Vec<&Vec<f64>> = labels
                    .iter()
                    .zip(points)
                    .filter(|(l, _)| **l == c)
                    .map(|(_, p)| p)
                    .collect();
                mean(&members, dim)
            })
            .collect();

        // Re-seed empty clusters with the point farthest from its centroid.
        let mut taken: Vec<usize> = Vec::new();
        for c in 0..k {
            if labels.iter().any(|&l| l == c) {
                continue;
            }
            let far = (0..points.len())
                .filter(|i| !taken.contains(i))
                .map(|i| (i, squared_distance(&points[i], &next[labels[i]])))
                .fold(None, |best: Option<(usize, f64)>, cur| match best {
                    Some(b) if b.1 >= cur.1 => Some(b),
                    _ => Some(cur),
                });
            if let Some((i, _)) = far {
                taken.push(i);
                labels[i] = c;
                next[c] = points[i].clone();
            }
        }

        let shift: f64 = centroids
            .iter()
            .zip(&next)
            .map(|(a, b)| squared_distance(a, b))
            .sum();
        centroids = next;
        if shift <= tolerance {
            break;
        }
    }

    let mut inertia = 0.0;
    for (label, p) in labels.iter_mut().zip(points) {
        let (c, d) = nearest(p, &centroids);
        *label = c;
        inertia += d;
    }
    KMeansFit {
        labels,
        centroids,
        inertia,
    }
}

/// Renumber labels to `0..count` in order of first use, dropping unused centroids.
fn compact_labels(labels: &[usize], centroids: Vec<Vec<f64>>) -> (Vec<usize>, Vec<Vec<f64>>) {
    let mut mapping: Vec<Option<usize>> = vec![None; centroids.len()];
    let mut kept = Vec::new();
    let mut out = Vec::with_capacity(labels.len());
    for &l in labels {
        let id = match mapping[l] {
            Some(id) => id,
            None => {
                let id = kept.len();
                mapping[l] = Some(id);
                kept.push(centroids[l].clone());
                id
            }
        };
        out.push(id);
    }
    (out, kept)
}

/// Mean silhouette coefficient; points in singleton clusters score 0.
fn silhouette(points: &[Vec<f64>], labels: &[usize], cluster_count: usize) -> f64 {
    let n = points.len();
    let mut sizes = vec![0usize; cluster_count];
    for &l in labels {
        sizes[l] += 1;
    }

    let mut total = 0.0;
    for i in 0..n {
        if sizes[labels[i]] <= 1 {
            continue;
        }
        let mut sums = vec![0.0; cluster_count];
        for j in 0..n {
            if i != j {
                sums[labels[j]] += euclidean(&points[i], &points[j]);
            }
        }
        let a = sums[labels[i]] / (sizes[labels[i]] - 1) as f64;
        let b = (0..cluster_count)
            .filter(|&c| c != labels[i] && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 && b.is_finite() {
            total += (b - a) / denom;
        }
    }
    (total / n as f64).clamp(-1.0, 1.0)
}

/// Density-based clustering. A point is a core point when at least
/// `min_samples` points (itself included) lie within `eps`; points not
/// reachable from any core point are noise.
fn dbscan(points: &[Vec<f64>], eps: f64, min_samples: usize) -> Vec<Option<usize>> {
    let n = points.len();
    let neighbors: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| euclidean(&points[i], &points[j]) <= eps)
                .collect()
        })
        .collect();

    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut next_id = 0;

    for i in 0..n {
        if visited[i] || neighbors[i].len() < min_samples {
            continue;
        }
        let id = next_id;
        next_id += 1;

        let mut stack = vec![i];
        while let Some(p) = stack.pop() {
            if visited[p] {
                continue;
            }
            visited[p] = true;
            labels[p] = Some(id);
            if neighbors[p].len() >= min_samples {
                for &q in &neighbors[p] {
                    if labels[q].is_none() {
                        labels[q] = Some(id);
                    }
                    if !visited[q] {
                        stack.push(q);
                    }
                }
            }
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;
    use trendwire_core::types::{ItemStatus, RawItem};

    fn make_item(key: &str, title: &str, priority: f64) -> Item {
        let mut item = Item::from_raw(
            RawItem {
                key: key.to_string(),
                title: title.to_string(),
                content: None,
                source: "rss".to_string(),
                source_name: "test".to_string(),
                published_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
                tags: vec![],
            },
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        );
        item.status = ItemStatus::Analyzed;
        item.priority_score = Some(priority);
        item
    }

    /// `groups` well-separated blobs of `per_group` points in 3 dimensions.
    fn blobs(groups: usize, per_group: usize) -> (Vec<Vec<f32>>, Vec<Item>) {
        let topics = ["robotics", "vaccine", "compiler", "satellite", "battery"];
        let mut embeddings = Vec::new();
        let mut items = Vec::new();
        for g in 0..groups {
            for m in 0..per_group {
                let jitter = m as f32 * 0.01;
                let base = g as f32 * 10.0;
                embeddings.push(vec![base + jitter, base - jitter, (g % 2) as f32 + jitter]);
                items.push(make_item(
                    &format!("g{}-{}", g, m),
                    &format!("{} update {}", topics[g % topics.len()], m),
                    0.5 + g as f64 * 0.1,
                ));
            }
        }
        (embeddings, items)
    }

    fn clusterer(method: &str) -> VectorClusterer {
        VectorClusterer::new(ClusteringConfig {
            method: method.to_string(),
            ..ClusteringConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_select_k_threshold_table() {
        let t = ClusteringConfig::default().k_thresholds;
        assert_eq!(select_k(3, &t, 2), 2);
        assert_eq!(select_k(14, &t, 2), 2);
        assert_eq!(select_k(15, &t, 2), 3);
        assert_eq!(select_k(24, &t, 2), 3);
        assert_eq!(select_k(25, &t, 2), 4);
        assert_eq!(select_k(39, &t, 2), 4);
        assert_eq!(select_k(40, &t, 2), 5);
        assert_eq!(select_k(500, &t, 2), 5);
    }

    #[test]
    fn test_select_k_is_monotonic_and_capped() {
        let t = ClusteringConfig::default().k_thresholds;
        let mut prev = 0;
        for n in 3..100 {
            let k = select_k(n, &t, 2);
            assert!(k >= prev);
            assert!(k < n);
            prev = k;
        }
        let tight = vec![KThreshold { min_articles: 1, k: 10 }];
        assert_eq!(select_k(4, &tight, 2), 3);
    }

    #[test]
    fn test_fifty_items_get_five_clusters() {
        let (embeddings, items) = blobs(5, 10);
        let result = clusterer("kmeans").cluster(&embeddings, &items).unwrap();

        assert_eq!(result.cluster_count, 5);
        assert_eq!(result.labels.len(), 50);
        for label in &result.labels {
            let id = label.expect("every item assigned");
            assert!(id <= 4);
        }
        assert!(result.noise.is_empty());

        // Each blob lands in its own cluster.
        for cluster in &result.clusters {
            let groups: HashSet<&str> = cluster
                .members
                .iter()
                .map(|m| m.item.key.split('-').next().unwrap())
                .collect();
            assert_eq!(groups.len(), 1);
            assert_eq!(cluster.article_count(), 10);
        }

        let quality = result.quality_score.unwrap();
        assert!((-1.0..=1.0).contains(&quality));
        assert!(quality > 0.9);
    }

    #[test]
    fn test_every_item_in_exactly_one_cluster() {
        let (embeddings, items) = blobs(3, 7);
        let result = clusterer("kmeans").cluster(&embeddings, &items).unwrap();

        let mut seen = HashSet::new();
        for cluster in &result.clusters {
            for m in &cluster.members {
                assert!(seen.insert(m.item.key.clone()), "duplicate {}", m.item.key);
            }
        }
        let all: HashSet<String> = items.iter().map(|i| i.key.clone()).collect();
        assert_eq!(seen, all);
    }

    #[test]
    fn test_clusters_sorted_by_average_priority_and_members_ranked() {
        let (embeddings, mut items) = blobs(3, 5);
        items[0].priority_score = Some(0.95);
        let result = clusterer("kmeans").cluster(&embeddings, &items).unwrap();

        for pair in result.clusters.windows(2) {
            assert!(pair[0].average_priority >= pair[1].average_priority);
        }
        let with_first = result
            .clusters
            .iter()
            .find(|c| c.members.iter().any(|m| m.item.key == "g0-0"))
            .unwrap();
        assert_eq!(with_first.members[0].item.key, "g0-0");
        for pair in with_first.members[1..].windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_cluster_keywords_describe_members() {
        let (embeddings, items) = blobs(2, 4);
        let result = clusterer("kmeans").cluster(&embeddings, &items).unwrap();
        let keywords: Vec<&String> = result.clusters.iter().flat_map(|c| &c.keywords).collect();
        assert!(keywords.iter().any(|k| k.as_str() == "robotics"));
        assert!(keywords.iter().any(|k| k.as_str() == "vaccine"));
        for cluster in &result.clusters {
            assert!(cluster.keywords.len() <= 5);
        }
    }

    #[test]
    fn test_clustering_is_deterministic_for_seed() {
        let (embeddings, items) = blobs(4, 6);
        let a = clusterer("kmeans").cluster(&embeddings, &items).unwrap();
        let b = clusterer("kmeans").cluster(&embeddings, &items).unwrap();
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_insufficient_data() {
        let (embeddings, items) = blobs(1, 2);
        let err = clusterer("kmeans").cluster(&embeddings, &items).unwrap_err();
        assert_eq!(err, ClusteringError::InsufficientData { n: 2, min: 3 });
    }

    #[test]
    fn test_row_count_mismatch() {
        let (embeddings, items) = blobs(1, 4);
        let err = clusterer("kmeans")
            .cluster(&embeddings[..3], &items)
            .unwrap_err();
        assert_eq!(
            err,
            ClusteringError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let (mut embeddings, items) = blobs(1, 4);
        embeddings[2].push(1.0);
        let err = clusterer("kmeans").cluster(&embeddings, &items).unwrap_err();
        assert!(matches!(err, ClusteringError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_unknown_method() {
        let (embeddings, items) = blobs(1, 4);
        let err = clusterer("spectral").cluster(&embeddings, &items).unwrap_err();
        assert_eq!(err, ClusteringError::UnknownMethod("spectral".to_string()));
    }

    #[test]
    fn test_identical_points_collapse_without_quality() {
        let embeddings = vec![vec![1.0, 1.0]; 4];
        let items: Vec<Item> = (0..4).map(|i| make_item(&i.to_string(), "same", 0.5)).collect();
        let result = clusterer("kmeans").cluster(&embeddings, &items).unwrap();

        let assigned: usize = result.clusters.iter().map(|c| c.article_count()).sum();
        assert_eq!(assigned, 4);
        if result.cluster_count < 2 {
            assert!(result.quality_score.is_none());
        }
    }

    #[test]
    fn test_dbscan_marks_sparse_points_as_noise() {
        let mut embeddings: Vec<Vec<f32>> = Vec::new();
        let mut items = Vec::new();
        for i in 0..4 {
            embeddings.push(vec![0.0 + i as f32 * 0.1, 0.0]);
            items.push(make_item(&format!("a{}", i), "robotics arm", 0.6));
        }
        for i in 0..3 {
            embeddings.push(vec![5.0 + i as f32 * 0.1, 5.0]);
            items.push(make_item(&format!("b{}", i), "vaccine trial", 0.9));
        }
        embeddings.push(vec![20.0, -20.0]);
        items.push(make_item("lonely", "outlier", 1.0));

        let result = clusterer("dbscan").cluster(&embeddings, &items).unwrap();
        assert_eq!(result.cluster_count, 2);
        assert_eq!(result.noise, vec!["lonely".to_string()]);
        assert_eq!(result.labels[7], None);
        assert!(result.quality_score.is_none());
        // Higher average priority first.
        assert_eq!(result.clusters[0].article_count(), 3);
        assert!((result.clusters[0].average_priority - 0.9).abs() < 1e-6);

        // Non-noise members cover all non-noise items exactly once.
        let members: usize = result.clusters.iter().map(|c| c.article_count()).sum();
        assert_eq!(members + result.noise.len(), items.len());
    }

    #[test]
    fn test_silhouette_singletons_score_zero() {
        let points = vec![vec![0.0], vec![0.1], vec![10.0]];
        let s = silhouette(&points, &[0, 0, 1], 2);
        // Two points score ~0.99, the singleton 0.
        assert!(s > 0.6 && s < 0.7);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = ClusteringConfig {
            restarts: 0,
            ..ClusteringConfig::default()
        };
        assert!(VectorClusterer::new(bad).is_err());
        let bad = ClusteringConfig {
            eps: 0.0,
            ..ClusteringConfig::default()
        };
        assert!(VectorClusterer::new(bad).is_err());
    }
}
