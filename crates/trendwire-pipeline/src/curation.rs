//! Candidate selection for the curate phase.

use tracing::{debug, Span};

use trendwire_core::config::{CurationConfig, GarbledTitleConfig};
use trendwire_core::types::Item;
use trendwire_insight::dedup::Deduplicator;
use trendwire_insight::trend::meets_threshold;

/// Punctuation that commonly appears in real headlines.
const HEADLINE_PUNCTUATION: &[char] = &[
    '.', ',', ':', ';', '!', '?', '\'', '"', '-', '(', ')', '&', '/', '%', '$', '+', '#', '@',
    '，', '。', '：', '；', '！', '？', '、', '“', '”', '‘', '’', '《', '》', '（', '）', '—', '…',
    '·', '–',
];

/// Whether `title` looks garbled: too short once whitespace is removed, or
/// too large a share of replacement, control or symbol characters.
pub fn is_garbled_title(title: &str, rule: &GarbledTitleConfig) -> bool {
    let visible: Vec<char> = title.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.len() < rule.min_visible_chars {
        return true;
    }
    let noise = visible
        .iter()
        .filter(|&&c| {
            c == '\u{FFFD}'
                || c.is_control()
                || (!c.is_alphanumeric() && !HEADLINE_PUNCTUATION.contains(&c))
        })
        .count();
    noise as f64 / visible.len() as f64 > rule.max_noise_ratio
}

/// Turns priority-ordered candidates into the items of one digest.
pub struct Curator {
    config: CurationConfig,
    dedup: Deduplicator,
    span: Span,
}

impl Curator {
    pub fn new(config: CurationConfig, dedup: Deduplicator) -> Self {
        Self {
            config,
            dedup,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.dedup = self.dedup.with_span(span.clone());
        self.span = span;
        self
    }

    pub fn candidate_pool(&self) -> usize {
        self.config.candidate_pool
    }

    /// Drop garbled titles and low-priority items, then near-duplicates,
    /// keeping at most `max_items` in input order.
    pub fn select(&self, candidates: Vec<Item>) -> Vec<Item> {
        let total = candidates.len();
        let filtered: Vec<Item> = candidates
            .into_iter()
            .filter(|item| {
                if is_garbled_title(&item.title, &self.config.garbled_title) {
                    debug!(parent: &self.span, key = %item.key, title = %item.title, "Skipping garbled title");
                    return false;
                }
                meets_threshold(item.priority(), self.config.min_priority)
            })
            .collect();
        let eligible = filtered.len();

        let selected = self.dedup.dedupe(filtered, self.config.max_items);
        debug!(
            parent: &self.span,
            candidates = total,
            eligible,
            selected = selected.len(),
            "Curated candidates"
        );
        selected
    }
}
