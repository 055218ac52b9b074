//! Store contract consumed by the pipeline.

use chrono::{DateTime, Utc};

use trendwire_core::error::Result;
use trendwire_core::types::{Analysis, Embedding, Item, ItemStatus};

/// CRUD access to items and their embeddings, keyed by item identity key.
///
/// Each method is one logical operation with its own short-lived
/// transaction scope, so the trait is safe to call from concurrent tasks.
pub trait ItemStore: Send + Sync {
    /// Insert a new item. Returns `false` without writing when the key exists.
    fn insert_if_absent(&self, item: &Item) -> Result<bool>;

    fn contains(&self, key: &str) -> Result<bool>;

    fn get(&self, key: &str) -> Result<Option<Item>>;

    /// Items with the given status, oldest collected first.
    fn list_by_status(&self, status: ItemStatus, limit: usize) -> Result<Vec<Item>>;

    /// Items with the given status published in `[since, until]`, highest
    /// priority first.
    fn top_by_priority(
        &self,
        status: ItemStatus,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Item>>;

    /// Every item published in `[since, until]`, oldest first.
    fn list_in_range(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Item>>;

    fn update_content(&self, key: &str, content: &str) -> Result<()>;

    /// Advance an item's status. Illegal transitions are rejected.
    fn update_status(&self, key: &str, status: ItemStatus) -> Result<()>;

    /// Record an analysis (and optionally its embedding) and advance the
    /// item to `Analyzed`, atomically.
    fn record_analysis(
        &self,
        key: &str,
        analysis: &Analysis,
        embedding: Option<&Embedding>,
        analyzed_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Insert or replace the embedding of one item for one model.
    fn put_embedding(&self, embedding: &Embedding) -> Result<()>;

    fn embedding(&self, key: &str, model: &str) -> Result<Option<Embedding>>;

    /// Items published in `[since, until]` that have an embedding for `model`.
    fn embedded_items(
        &self,
        model: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<(Item, Embedding)>>;

    fn count_by_status(&self) -> Result<Vec<(ItemStatus, u64)>>;
}
