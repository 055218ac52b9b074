//! Benchmarks for clustering a periodic run's worth of embeddings.
//!
//! A weekly report typically clusters a few hundred items with 256 to 1536
//! dimensional embeddings. These benchmarks cover both strategies plus
//! keyword extraction at that scale.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use trendwire_core::config::ClusteringConfig;
use trendwire_core::types::{Item, RawItem};
use trendwire_insight::cluster::VectorClusterer;

const TOPICS: [&str; 6] = [
    "robotics warehouse automation",
    "vaccine trial results",
    "compiler optimization release",
    "satellite launch schedule",
    "battery chemistry breakthrough",
    "chip export policy",
];

/// `n` items spread over six topics, each with a `dim`-dimensional embedding
/// offset along a topic-specific axis.
fn generate_dataset(n: usize, dim: usize) -> (Vec<Vec<f32>>, Vec<Item>) {
    let published = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let mut embeddings = Vec::with_capacity(n);
    let mut items = Vec::with_capacity(n);

    for i in 0..n {
        let topic = i % TOPICS.len();
        let mut v: Vec<f32> = (0..dim)
            .map(|d| (((i * 31 + d * 17) % 97) as f32 / 97.0) * 0.1)
            .collect();
        v[topic % dim] += 1.0;
        embeddings.push(v);

        let mut item = Item::from_raw(
            RawItem {
                key: format!("https://news.test/{}", i),
                title: format!("{} story {}", TOPICS[topic], i),
                content: None,
                source: "rss".to_string(),
                source_name: "bench".to_string(),
                published_at: published,
                tags: vec![],
            },
            published,
        );
        item.summary = Some(format!("Coverage of {} with details", TOPICS[topic]));
        item.priority_score = Some(((i % 10) as f64) / 10.0);
        items.push(item);
    }
    (embeddings, items)
}

fn bench_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    let clusterer = VectorClusterer::new(ClusteringConfig::default()).unwrap();
    for &(n, dim) in &[(50, 256), (200, 256), (200, 1536)] {
        let (embeddings, items) = generate_dataset(n, dim);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", n, dim)),
            &(embeddings, items),
            |b, (embeddings, items)| b.iter(|| clusterer.cluster(embeddings, items).unwrap()),
        );
    }
    group.finish();
}

fn bench_dbscan(c: &mut Criterion) {
    let mut group = c.benchmark_group("dbscan");
    group.sample_size(20);

    let clusterer = VectorClusterer::new(ClusteringConfig {
        method: "dbscan".to_string(),
        ..ClusteringConfig::default()
    })
    .unwrap();
    let (embeddings, items) = generate_dataset(200, 256);
    group.bench_function("200x256", |b| {
        b.iter(|| clusterer.cluster(&embeddings, &items).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_kmeans, bench_dbscan);
criterion_main!(benches);
