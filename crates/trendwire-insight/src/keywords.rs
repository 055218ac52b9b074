//! TF-IDF keyword model used to describe clusters.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;

use crate::error::InsightError;

/// English stop words excluded from keyword extraction.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "almost", "also", "am", "among",
    "an", "and", "any", "are", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down",
    "during", "each", "either", "else", "etc", "even", "ever", "every", "few", "for", "from",
    "further", "get", "gets", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "however", "if", "in", "into", "is", "it", "its",
    "itself", "just", "last", "least", "less", "made", "make", "many", "may", "me", "might",
    "more", "most", "much", "must", "my", "myself", "neither", "never", "new", "next", "no",
    "nor", "not", "now", "of", "off", "often", "on", "once", "one", "only", "or", "other",
    "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "per", "perhaps",
    "please", "put", "rather", "re", "same", "see", "seem", "seemed", "seems", "several", "she",
    "should", "since", "so", "some", "still", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "though",
    "through", "thus", "to", "together", "too", "toward", "towards", "under", "until", "up",
    "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when",
    "whence", "where", "whether", "which", "while", "who", "whoever", "whole", "whom", "whose",
    "why", "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
    "yourself", "yourselves",
];

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Tokenizer producing lower-cased unigrams and bigrams with stop words removed.
pub struct Tokenizer {
    word: Regex,
}

impl Tokenizer {
    pub fn new() -> Result<Self, InsightError> {
        Ok(Self {
            word: Regex::new(r"\b\w\w+\b")?,
        })
    }

    pub fn terms(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = self
            .word
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|w| !is_stop_word(w))
            .collect();

        let mut terms: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        terms.extend(words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
        terms
    }
}

/// A TF-IDF model fitted once over a background corpus.
///
/// Rows are L2-normalised term weights; IDF is smoothed as
/// `ln((1 + n) / (1 + df)) + 1`.
pub struct TfIdfModel {
    vocabulary: Vec<String>,
    rows: Vec<HashMap<usize, f64>>,
}

impl TfIdfModel {
    pub fn fit(tokenizer: &Tokenizer, documents: &[String]) -> Self {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenizer.terms(d)).collect();

        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for terms in &tokenized {
            let mut seen: Vec<&str> = terms.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let vocabulary: Vec<String> = doc_freq.keys().map(|t| t.to_string()).collect();
        let index: HashMap<&str, usize> = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        let n = documents.len() as f64;
        let idf: Vec<f64> = doc_freq
            .values()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        let rows = tokenized
            .iter()
            .map(|terms| {
                let mut row: HashMap<usize, f64> = HashMap::new();
                for term in terms {
                    if let Some(&i) = index.get(term.as_str()) {
                        *row.entry(i).or_insert(0.0) += 1.0;
                    }
                }
                for (i, weight) in row.iter_mut() {
                    *weight *= idf[*i];
                }
                let norm = row.values().map(|w| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for weight in row.values_mut() {
                        *weight /= norm;
                    }
                }
                row
            })
            .collect();

        Self { vocabulary, rows }
    }

    /// Highest-weighted terms of the mean vector over `docs`.
    pub fn top_terms(&self, docs: &[usize], k: usize) -> Vec<String> {
        let docs: Vec<usize> = docs
            .iter()
            .copied()
            .filter(|&d| d < self.rows.len())
            .collect();
        if docs.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut mean: HashMap<usize, f64> = HashMap::new();
        for &d in &docs {
            for (&term, &weight) in &self.rows[d] {
                *mean.entry(term).or_insert(0.0) += weight;
            }
        }
        let count = docs.len() as f64;

        let mut ranked: Vec<(usize, f64)> = mean
            .into_iter()
            .map(|(term, sum)| (term, sum / count))
            .filter(|(_, w)| *w > 0.0)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| self.vocabulary[a.0].cmp(&self.vocabulary[b.0]))
        });

        ranked
            .into_iter()
            .take(k)
            .map(|(term, _)| self.vocabulary[term].clone())
            .collect()
    }
}
