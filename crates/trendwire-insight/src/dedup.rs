//! Near-duplicate removal for curated items via keyword-set Jaccard similarity.

use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, Span};

use trendwire_core::config::{DedupConfig, DomainMarker};
use trendwire_core::types::Item;

use crate::error::InsightError;

/// Removes near-duplicates from a priority-ordered candidate list.
///
/// Each candidate's keyword set is built from its title and a summary prefix:
/// CJK n-grams (2 to 4 characters), lower-cased Latin words of 3+ characters,
/// and weighted pseudo-keywords for every domain marker found in the text.
/// A candidate is dropped when its Jaccard similarity with any already
/// retained candidate exceeds the threshold, so the earlier item always wins.
pub struct Deduplicator {
    threshold: f64,
    summary_prefix_chars: usize,
    markers: Vec<DomainMarker>,
    latin: Regex,
    span: Span,
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Result<Self, InsightError> {
        if !(0.0..=1.0).contains(&config.similarity_threshold) {
            return Err(InsightError::Config(format!(
                "dedup.similarity_threshold must be within [0, 1], got {}",
                config.similarity_threshold
            )));
        }
        Ok(Self {
            threshold: config.similarity_threshold,
            summary_prefix_chars: config.summary_prefix_chars,
            markers: config
                .markers
                .iter()
                .filter(|m| !m.term.trim().is_empty())
                .cloned()
                .collect(),
            latin: Regex::new(r"[A-Za-z][A-Za-z0-9]{2,}")?,
            span: Span::none(),
        })
    }

    /// Attach the span this component logs under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Keep at most `max_count` candidates, dropping near-duplicates.
    ///
    /// Relative input order of the retained candidates is preserved.
    pub fn dedupe(&self, candidates: Vec<Item>, max_count: usize) -> Vec<Item> {
        let mut kept: Vec<Item> = Vec::new();
        let mut kept_sets: Vec<HashSet<String>> = Vec::new();

        for candidate in candidates {
            if kept.len() >= max_count {
                break;
            }
            let set = self.item_keywords(&candidate);

            let duplicate_of = kept_sets
                .iter()
                .enumerate()
                .map(|(i, other)| (i, jaccard(&set, other)))
                .find(|(_, sim)| *sim > self.threshold);

            match duplicate_of {
                Some((i, similarity)) => {
                    debug!(
                        parent: &self.span,
                        key = %candidate.key,
                        kept = %kept[i].key,
                        similarity,
                        "Dropping near-duplicate"
                    );
                }
                None => {
                    kept_sets.push(set);
                    kept.push(candidate);
                }
            }
        }
        kept
    }

    /// Keyword set of one item: title plus the first characters of its summary.
    pub fn item_keywords(&self, item: &Item) -> HashSet<String> {
        let prefix: String = item
            .summary_text()
            .chars()
            .take(self.summary_prefix_chars)
            .collect();
        self.keywords(&format!("{} {}", item.title, prefix))
    }

    pub fn keywords(&self, text: &str) -> HashSet<String> {
        let mut set = HashSet::new();

        for run in cjk_runs(text) {
            for len in 2..=4 {
                if run.len() < len {
                    break;
                }
                for window in run.windows(len) {
                    set.insert(window.iter().collect::<String>());
                }
            }
        }

        for m in self.latin.find_iter(text) {
            set.insert(m.as_str().to_lowercase());
        }

        let lowered = text.to_lowercase();
        for marker in &self.markers {
            if lowered.contains(&marker.term.to_lowercase()) {
                for i in 0..marker.weight {
                    set.insert(format!("§{}#{}", marker.term.to_lowercase(), i));
                }
            }
        }
        set
    }
}

/// `|a ∩ b| / |a ∪ b|`, zero when both sets are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2A6DF}')
}

/// Maximal runs of consecutive CJK ideographs.
fn cjk_runs(text: &str) -> Vec<Vec<char>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for c in text.chars() {
        if is_cjk(c) {
            current.push(c);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}
