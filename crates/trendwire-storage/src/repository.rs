//! SQLite-backed implementation of [`ItemStore`].

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use trendwire_core::error::{Result, TrendwireError};
use trendwire_core::types::{validate_transition, Analysis, Embedding, Item, ItemStatus};

use crate::db::Database;
use crate::store::ItemStore;

const ITEM_COLUMNS: &str = "key, title, content, status, source, source_name, published_at,
     collected_at, tags, summary, key_insights, category, relevance_score, priority_score,
     reasoning, analyzed_at";

/// Repository for items and embeddings.
pub struct ItemRepository {
    db: Arc<Database>,
}

impl ItemRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn query_items<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Item>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(storage_err)?;
            let rows = stmt
                .query_map(params, |row| Ok(row_to_item(row)))
                .map_err(storage_err)?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row.map_err(storage_err)??);
            }
            Ok(items)
        })
    }
}

impl ItemStore for ItemRepository {
    fn insert_if_absent(&self, item: &Item) -> Result<bool> {
        let tags = serde_json::to_string(&item.tags)?;
        let insights = serde_json::to_string(&item.key_insights)?;
        self.db.with_conn(|conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO items (key, title, content, status, source, source_name,
                        published_at, collected_at, tags, summary, key_insights, category,
                        relevance_score, priority_score, reasoning, analyzed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    rusqlite::params![
                        item.key,
                        item.title,
                        item.content,
                        item.status.as_str(),
                        item.source,
                        item.source_name,
                        item.published_at.timestamp_millis(),
                        item.collected_at.timestamp_millis(),
                        tags,
                        item.summary,
                        insights,
                        item.category,
                        item.relevance_score,
                        item.priority_score,
                        item.reasoning,
                        item.analyzed_at.map(|t| t.timestamp_millis()),
                    ],
                )
                .map_err(|e| TrendwireError::Storage(format!("Failed to insert item: {}", e)))?;
            Ok(inserted == 1)
        })
    }

    fn contains(&self, key: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM items WHERE key = ?1",
                    rusqlite::params![key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            Ok(found.is_some())
        })
    }

    fn get(&self, key: &str) -> Result<Option<Item>> {
        let sql = format!("SELECT {} FROM items WHERE key = ?1", ITEM_COLUMNS);
        Ok(self
            .query_items(&sql, rusqlite::params![key])?
            .into_iter()
            .next())
    }

    fn list_by_status(&self, status: ItemStatus, limit: usize) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {} FROM items WHERE status = ?1 ORDER BY collected_at ASC, key ASC LIMIT ?2",
            ITEM_COLUMNS
        );
        self.query_items(&sql, rusqlite::params![status.as_str(), limit as i64])
    }

    fn top_by_priority(
        &self,
        status: ItemStatus,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {} FROM items
             WHERE status = ?1 AND published_at >= ?2 AND published_at <= ?3
             ORDER BY COALESCE(priority_score, 0) DESC, published_at DESC, key ASC
             LIMIT ?4",
            ITEM_COLUMNS
        );
        self.query_items(
            &sql,
            rusqlite::params![
                status.as_str(),
                since.timestamp_millis(),
                until.timestamp_millis(),
                limit as i64
            ],
        )
    }

    fn list_in_range(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {} FROM items
             WHERE published_at >= ?1 AND published_at <= ?2
             ORDER BY published_at ASC, key ASC",
            ITEM_COLUMNS
        );
        self.query_items(
            &sql,
            rusqlite::params![since.timestamp_millis(), until.timestamp_millis()],
        )
    }

    fn update_content(&self, key: &str, content: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE items SET content = ?2 WHERE key = ?1",
                    rusqlite::params![key, content],
                )
                .map_err(storage_err)?;
            if changed == 0 {
                return Err(TrendwireError::NotFound(key.to_string()));
            }
            Ok(())
        })
    }

    fn update_status(&self, key: &str, status: ItemStatus) -> Result<()> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(storage_err)?;
            let current =
                current_status(&tx, key)?.ok_or_else(|| TrendwireError::NotFound(key.to_string()))?;
            validate_transition(current, status)?;
            tx.execute(
                "UPDATE items SET status = ?2 WHERE key = ?1",
                rusqlite::params![key, status.as_str()],
            )
            .map_err(storage_err)?;
            tx.commit().map_err(storage_err)?;
            debug!(key, from = %current, to = %status, "Item status updated");
            Ok(())
        })
    }

    fn record_analysis(
        &self,
        key: &str,
        analysis: &Analysis,
        embedding: Option<&Embedding>,
        analyzed_at: DateTime<Utc>,
    ) -> Result<()> {
        let analysis = analysis.clamped();
        let insights = serde_json::to_string(&analysis.key_insights)?;
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(storage_err)?;
            let current =
                current_status(&tx, key)?.ok_or_else(|| TrendwireError::NotFound(key.to_string()))?;
            validate_transition(current, ItemStatus::Analyzed)?;

            let existing_tags: String = tx
                .query_row(
                    "SELECT tags FROM items WHERE key = ?1",
                    rusqlite::params![key],
                    |row| row.get(0),
                )
                .map_err(storage_err)?;
            let mut tags: std::collections::BTreeSet<String> =
                serde_json::from_str(&existing_tags)?;
            tags.extend(analysis.tags.iter().cloned());
            let tags = serde_json::to_string(&tags)?;

            tx.execute(
                "UPDATE items SET status = 'analyzed', summary = ?2, key_insights = ?3,
                    category = ?4, relevance_score = ?5, priority_score = ?6, reasoning = ?7,
                    tags = ?8, analyzed_at = ?9
                 WHERE key = ?1",
                rusqlite::params![
                    key,
                    analysis.summary,
                    insights,
                    analysis.category,
                    analysis.relevance_score,
                    analysis.priority_score,
                    analysis.reasoning,
                    tags,
                    analyzed_at.timestamp_millis(),
                ],
            )
            .map_err(|e| TrendwireError::Storage(format!("Failed to record analysis: {}", e)))?;

            if let Some(embedding) = embedding {
                write_embedding(&tx, embedding, analyzed_at)?;
            }

            tx.commit().map_err(storage_err)?;
            Ok(())
        })
    }

    fn put_embedding(&self, embedding: &Embedding) -> Result<()> {
        self.db
            .with_conn(|conn| write_embedding(conn, embedding, Utc::now()))
    }

    fn embedding(&self, key: &str, model: &str) -> Result<Option<Embedding>> {
        self.db.with_conn(|conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT vector FROM embeddings WHERE item_key = ?1 AND model = ?2",
                    rusqlite::params![key, model],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            Ok(blob.map(|b| Embedding::new(key, model, decode_vector(&b))))
        })
    }

    fn embedded_items(
        &self,
        model: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<(Item, Embedding)>> {
        let columns: Vec<String> = ITEM_COLUMNS
            .split(',')
            .map(|c| format!("i.{}", c.trim()))
            .collect();
        let sql = format!(
            "SELECT {}, e.vector FROM items i
             JOIN embeddings e ON e.item_key = i.key
             WHERE e.model = ?1 AND i.published_at >= ?2 AND i.published_at <= ?3
             ORDER BY i.published_at ASC, i.key ASC",
            columns.join(", ")
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![model, since.timestamp_millis(), until.timestamp_millis()],
                    |row| {
                        let blob: Vec<u8> = row.get(16)?;
                        Ok((row_to_item(row), blob))
                    },
                )
                .map_err(storage_err)?;

            let mut out = Vec::new();
            for row in rows {
                let (item, blob) = row.map_err(storage_err)?;
                let item = item?;
                let embedding = Embedding::new(item.key.clone(), model, decode_vector(&blob));
                out.push((item, embedding));
            }
            Ok(out)
        })
    }

    fn count_by_status(&self) -> Result<Vec<(ItemStatus, u64)>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT status, COUNT(*) FROM items GROUP BY status ORDER BY status")
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .map_err(storage_err)?;

            let mut counts = Vec::new();
            for row in rows {
                let (status, count) = row.map_err(storage_err)?;
                let status = ItemStatus::parse(&status).ok_or_else(|| {
                    TrendwireError::Storage(format!("Unknown status in database: {}", status))
                })?;
                counts.push((status, count as u64));
            }
            Ok(counts)
        })
    }
}

fn storage_err(e: rusqlite::Error) -> TrendwireError {
    TrendwireError::Storage(e.to_string())
}

fn current_status(conn: &Connection, key: &str) -> Result<Option<ItemStatus>> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM items WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err)?;
    status
        .map(|s| {
            ItemStatus::parse(&s)
                .ok_or_else(|| TrendwireError::Storage(format!("Unknown status: {}", s)))
        })
        .transpose()
}

/// Insert or replace one embedding, enforcing a fixed dimension per model.
fn write_embedding(conn: &Connection, embedding: &Embedding, at: DateTime<Utc>) -> Result<()> {
    if embedding.vector.is_empty() {
        return Err(TrendwireError::Storage(format!(
            "Empty embedding for {}",
            embedding.item_key
        )));
    }

    let existing: Option<i64> = conn
        .query_row(
            "SELECT dimension FROM embeddings WHERE model = ?1 AND item_key != ?2 LIMIT 1",
            rusqlite::params![embedding.model, embedding.item_key],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err)?;
    if let Some(expected) = existing {
        if expected as usize != embedding.dimension() {
            return Err(TrendwireError::DimensionMismatch {
                model: embedding.model.clone(),
                expected: expected as usize,
                actual: embedding.dimension(),
            });
        }
    }

    conn.execute(
        "INSERT OR REPLACE INTO embeddings (item_key, model, dimension, vector, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            embedding.item_key,
            embedding.model,
            embedding.dimension() as i64,
            encode_vector(&embedding.vector),
            at.timestamp_millis(),
        ],
    )
    .map_err(|e| TrendwireError::Storage(format!("Failed to store embedding: {}", e)))?;
    Ok(())
}

fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| TrendwireError::Storage(format!("Invalid timestamp: {}", ms)))
}

/// Convert a row selected with [`ITEM_COLUMNS`] into an [`Item`].
fn row_to_item(row: &rusqlite::Row<'_>) -> Result<Item> {
    let status: String = row.get(3).map_err(storage_err)?;
    let tags: String = row.get(8).map_err(storage_err)?;
    let insights: String = row.get(10).map_err(storage_err)?;
    let relevance: Option<f64> = row.get(12).map_err(storage_err)?;
    let priority: Option<f64> = row.get(13).map_err(storage_err)?;
    let analyzed_at: Option<i64> = row.get(15).map_err(storage_err)?;

    Ok(Item {
        key: row.get(0).map_err(storage_err)?,
        title: row.get(1).map_err(storage_err)?,
        content: row.get(2).map_err(storage_err)?,
        status: ItemStatus::parse(&status)
            .ok_or_else(|| TrendwireError::Storage(format!("Unknown status: {}", status)))?,
        source: row.get(4).map_err(storage_err)?,
        source_name: row.get(5).map_err(storage_err)?,
        published_at: millis_to_datetime(row.get(6).map_err(storage_err)?)?,
        collected_at: millis_to_datetime(row.get(7).map_err(storage_err)?)?,
        tags: serde_json::from_str(&tags)?,
        summary: row.get(9).map_err(storage_err)?,
        key_insights: serde_json::from_str(&insights)?,
        category: row.get(11).map_err(storage_err)?,
        relevance_score: relevance,
        priority_score: priority,
        reasoning: row.get(14).map_err(storage_err)?,
        analyzed_at: analyzed_at.map(millis_to_datetime).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use trendwire_core::types::RawItem;

    fn make_repo() -> ItemRepository {
        ItemRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn make_item(key: &str, hours_ago: i64) -> Item {
        Item::from_raw(
            RawItem {
                key: key.to_string(),
                title: format!("Title for {}", key),
                content: Some("Body text".to_string()),
                source: "rss".to_string(),
                source_name: "Example".to_string(),
                published_at: base_time() - Duration::hours(hours_ago),
                tags: vec!["ai".to_string()],
            },
            base_time(),
        )
    }

    fn make_analysis(priority: f64) -> Analysis {
        Analysis {
            summary: "Summary".to_string(),
            key_insights: vec!["insight".to_string()],
            category: "research".to_string(),
            relevance_score: 0.8,
            priority_score: priority,
            reasoning: "because".to_string(),
            tags: vec!["paper".to_string()],
        }
    }

    #[test]
    fn test_insert_and_get() {
        let repo = make_repo();
        let item = make_item("https://a.test/1", 1);
        assert!(repo.insert_if_absent(&item).unwrap());

        let found = repo.get("https://a.test/1").unwrap().unwrap();
        assert_eq!(found, item);
        assert!(repo.contains("https://a.test/1").unwrap());
        assert!(!repo.contains("https://a.test/2").unwrap());
    }

    #[test]
    fn test_insert_duplicate_key_is_ignored() {
        let repo = make_repo();
        let item = make_item("https://a.test/1", 1);
        assert!(repo.insert_if_absent(&item).unwrap());

        let mut changed = item.clone();
        changed.title = "Different".to_string();
        assert!(!repo.insert_if_absent(&changed).unwrap());
        assert_eq!(repo.get(&item.key).unwrap().unwrap().title, item.title);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let repo = make_repo();
        assert!(repo.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_record_analysis_advances_status_and_merges_tags() {
        let repo = make_repo();
        repo.insert_if_absent(&make_item("k1", 1)).unwrap();

        let emb = Embedding::new("k1", "m", vec![0.1, 0.2, 0.3]);
        repo.record_analysis("k1", &make_analysis(1.4), Some(&emb), base_time())
            .unwrap();

        let item = repo.get("k1").unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Analyzed);
        assert_eq!(item.priority_score, Some(1.0));
        assert!(item.tags.contains("ai"));
        assert!(item.tags.contains("paper"));
        assert_eq!(item.analyzed_at, Some(base_time()));

        let stored = repo.embedding("k1", "m").unwrap().unwrap();
        assert_eq!(stored.vector, vec![0.1, 0.2, 0.3]);
        assert!(repo.embedding("k1", "other").unwrap().is_none());
    }

    #[test]
    fn test_record_analysis_twice_is_rejected() {
        let repo = make_repo();
        repo.insert_if_absent(&make_item("k1", 1)).unwrap();
        repo.record_analysis("k1", &make_analysis(0.5), None, base_time())
            .unwrap();
        let err = repo
            .record_analysis("k1", &make_analysis(0.5), None, base_time())
            .unwrap_err();
        assert!(matches!(err, TrendwireError::InvalidTransition { .. }));
    }

    #[test]
    fn test_record_analysis_missing_item() {
        let repo = make_repo();
        let err = repo
            .record_analysis("ghost", &make_analysis(0.5), None, base_time())
            .unwrap_err();
        assert!(matches!(err, TrendwireError::NotFound(_)));
    }

    #[test]
    fn test_dimension_mismatch_rolls_back_analysis() {
        let repo = make_repo();
        repo.insert_if_absent(&make_item("k1", 1)).unwrap();
        repo.insert_if_absent(&make_item("k2", 1)).unwrap();
        repo.record_analysis(
            "k1",
            &make_analysis(0.5),
            Some(&Embedding::new("k1", "m", vec![1.0, 0.0])),
            base_time(),
        )
        .unwrap();

        let err = repo
            .record_analysis(
                "k2",
                &make_analysis(0.5),
                Some(&Embedding::new("k2", "m", vec![1.0, 0.0, 0.0])),
                base_time(),
            )
            .unwrap_err();
        assert!(matches!(err, TrendwireError::DimensionMismatch { expected: 2, actual: 3, .. }));

        // The whole transaction was rolled back.
        assert_eq!(
            repo.get("k2").unwrap().unwrap().status,
            ItemStatus::Collected
        );
    }

    #[test]
    fn test_put_embedding_replaces_per_model() {
        let repo = make_repo();
        repo.insert_if_absent(&make_item("k1", 1)).unwrap();
        repo.put_embedding(&Embedding::new("k1", "m", vec![1.0, 2.0]))
            .unwrap();
        repo.put_embedding(&Embedding::new("k1", "m", vec![3.0, 4.0]))
            .unwrap();
        assert_eq!(
            repo.embedding("k1", "m").unwrap().unwrap().vector,
            vec![3.0, 4.0]
        );
    }

    #[test]
    fn test_update_status_validates_transitions() {
        let repo = make_repo();
        repo.insert_if_absent(&make_item("k1", 1)).unwrap();

        assert!(repo.update_status("k1", ItemStatus::Reported).is_err());
        repo.update_status("k1", ItemStatus::ExtractionFailed).unwrap();
        assert!(repo.update_status("k1", ItemStatus::Analyzed).is_err());
        assert!(matches!(
            repo.update_status("ghost", ItemStatus::Analyzed),
            Err(TrendwireError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_content() {
        let repo = make_repo();
        repo.insert_if_absent(&make_item("k1", 1)).unwrap();
        repo.update_content("k1", "Extracted body").unwrap();
        assert_eq!(
            repo.get("k1").unwrap().unwrap().content.as_deref(),
            Some("Extracted body")
        );
        assert!(repo.update_content("ghost", "x").is_err());
    }

    #[test]
    fn test_top_by_priority_orders_and_filters() {
        let repo = make_repo();
        for (key, priority, hours) in [("a", 0.2, 1), ("b", 0.9, 2), ("c", 0.5, 3), ("old", 1.0, 100)] {
            repo.insert_if_absent(&make_item(key, hours)).unwrap();
            repo.record_analysis(key, &make_analysis(priority), None, base_time())
                .unwrap();
        }
        repo.insert_if_absent(&make_item("unanalyzed", 1)).unwrap();

        let top = repo
            .top_by_priority(
                ItemStatus::Analyzed,
                base_time() - Duration::hours(24),
                base_time(),
                2,
            )
            .unwrap();
        let keys: Vec<&str> = top.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn test_list_by_status_and_counts() {
        let repo = make_repo();
        for key in ["a", "b", "c"] {
            repo.insert_if_absent(&make_item(key, 1)).unwrap();
        }
        repo.update_status("c", ItemStatus::ExtractionFailed).unwrap();

        let collected = repo.list_by_status(ItemStatus::Collected, 10).unwrap();
        assert_eq!(collected.len(), 2);
        assert_eq!(repo.list_by_status(ItemStatus::Collected, 1).unwrap().len(), 1);

        let counts = repo.count_by_status().unwrap();
        assert!(counts.contains(&(ItemStatus::Collected, 2)));
        assert!(counts.contains(&(ItemStatus::ExtractionFailed, 1)));
    }

    #[test]
    fn test_list_in_range() {
        let repo = make_repo();
        repo.insert_if_absent(&make_item("recent", 2)).unwrap();
        repo.insert_if_absent(&make_item("older", 30)).unwrap();

        let items = repo
            .list_in_range(base_time() - Duration::hours(24), base_time())
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "recent");
    }

    #[test]
    fn test_embedded_items_joins_by_model_and_range() {
        let repo = make_repo();
        for key in ["a", "b", "c"] {
            repo.insert_if_absent(&make_item(key, 1)).unwrap();
        }
        repo.record_analysis(
            "a",
            &make_analysis(0.5),
            Some(&Embedding::new("a", "m", vec![1.0, 0.0])),
            base_time(),
        )
        .unwrap();
        repo.record_analysis(
            "b",
            &make_analysis(0.5),
            Some(&Embedding::new("b", "other", vec![0.0, 1.0, 2.0])),
            base_time(),
        )
        .unwrap();

        let pairs = repo
            .embedded_items("m", base_time() - Duration::hours(24), base_time())
            .unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.key, "a");
        assert_eq!(pairs[0].1.vector, vec![1.0, 0.0]);
    }

    #[test]
    fn test_vector_codec() {
        let v = vec![0.0, -1.5, 3.25, f32::MAX];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }
}
