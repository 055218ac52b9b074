//! Database schema migrations.
//!
//! Applies the initial schema: the items, embeddings, and
//! schema_migrations tables.

use rusqlite::Connection;
use tracing::info;

use trendwire_core::error::TrendwireError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), TrendwireError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| TrendwireError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| {
            TrendwireError::Storage(format!("Failed to query migration version: {}", e))
        })?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: items and their per-model embeddings.
fn apply_v1(conn: &Connection) -> Result<(), TrendwireError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS items (
            key             TEXT PRIMARY KEY NOT NULL,
            title           TEXT NOT NULL,
            content         TEXT,
            status          TEXT NOT NULL
                            CHECK (status IN ('collected', 'analyzed', 'extraction_failed', 'reported')),
            source          TEXT NOT NULL DEFAULT '',
            source_name     TEXT NOT NULL DEFAULT '',
            published_at    INTEGER NOT NULL,
            collected_at    INTEGER NOT NULL,
            tags            TEXT NOT NULL DEFAULT '[]',
            summary         TEXT,
            key_insights    TEXT NOT NULL DEFAULT '[]',
            category        TEXT,
            relevance_score REAL,
            priority_score  REAL,
            reasoning       TEXT,
            analyzed_at     INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_items_status ON items(status);
        CREATE INDEX IF NOT EXISTS idx_items_published ON items(published_at);
        CREATE INDEX IF NOT EXISTS idx_items_priority ON items(status, priority_score DESC);

        -- One embedding per (item, model); all rows of one model share a dimension.
        CREATE TABLE IF NOT EXISTS embeddings (
            item_key    TEXT NOT NULL REFERENCES items(key) ON DELETE CASCADE,
            model       TEXT NOT NULL,
            dimension   INTEGER NOT NULL,
            vector      BLOB NOT NULL,
            created_at  INTEGER NOT NULL,
            PRIMARY KEY (item_key, model)
        );

        CREATE INDEX IF NOT EXISTS idx_embeddings_model ON embeddings(model);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| TrendwireError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
