//! Content-addressed storage using SQLite
//!
//! This module handles durable storage for the ingestion pipeline:
//! - Blobs (immutable binary content, deduplicated by checksum)
//! - Metadata (one per blob: filename, MIME type, size)
//! - Texts (raw OCR output, refined text, quality score, tags)
//! - The registry of dynamically created per-model vector tables

mod schema;
pub mod vectors;

pub use schema::*;
pub use vectors::VectorStore;

use crate::error::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Compute the checksum of a whole byte buffer (lowercase hex)
pub fn compute_checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Streaming checksum over arbitrary call boundaries.
///
/// Produces the same digest as [`compute_checksum`] for the same byte
/// sequence regardless of how it is chunked.
#[derive(Default)]
pub struct Checksummer {
    hasher: blake3::Hasher,
}

impl Checksummer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    pub fn finalize(self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

/// File metadata supplied at ingestion time
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub filename: String,
    pub mime: String,
    pub size: i64,
}

/// A stored metadata row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub blob_id: String,
    pub filename: String,
    pub mime: String,
    pub size: i64,
    pub created_at: String,
}

/// A stored text row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TextRecord {
    pub blob_id: String,
    pub raw: Option<String>,
    pub refined: Option<String>,
    pub score: Option<f64>,
    pub tags_json: Option<String>,
    pub updated_at: String,
}

impl TextRecord {
    /// Deduplicated, sorted tag set
    pub fn tags(&self) -> Vec<String> {
        self.tags_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }
}

/// Partial update for a text row; only supplied fields are written
#[derive(Debug, Clone, Default)]
pub struct TextUpdate {
    pub raw: Option<String>,
    pub refined: Option<String>,
    pub score: Option<f64>,
    pub tags: Option<Vec<String>>,
}

impl TextUpdate {
    pub fn is_empty(&self) -> bool {
        self.raw.is_none() && self.refined.is_none() && self.score.is_none() && self.tags.is_none()
    }
}

/// Global row counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub blob_count: usize,
    pub text_count: usize,
    pub vector_table_count: usize,
}

/// Archive database handle
#[derive(Clone)]
pub struct DocStore {
    pool: SqlitePool,
}

impl DocStore {
    /// Open (and initialize if needed) the database at the given path
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Underlying connection pool, shared with [`VectorStore`]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Vector-table handle over the same database
    pub fn vectors(&self) -> VectorStore {
        VectorStore::new(self.pool.clone())
    }

    // ===== Blob Operations =====

    /// Look up a blob id by checksum
    pub async fn find_by_checksum(&self, checksum: &str) -> Result<Option<String>> {
        let id: Option<String> = sqlx::query_scalar("SELECT id FROM blobs WHERE checksum = ?")
            .bind(checksum)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// Insert a blob or reuse the existing one with the same checksum.
    ///
    /// The blob insert and the metadata upsert run in one transaction. A
    /// concurrent insert of the same checksum is absorbed by the unique
    /// constraint (`ON CONFLICT DO NOTHING`) and resolved as a lookup, never
    /// surfaced as an error. Returns the blob id and whether it was new.
    pub async fn insert_or_reuse(
        &self,
        bytes: &[u8],
        checksum: &str,
        meta: &FileMeta,
    ) -> Result<(String, bool)> {
        let mut tx = self.pool.begin().await?;

        let candidate_id = Uuid::new_v4().to_string();
        let inserted = sqlx::query(
            r#"
            INSERT INTO blobs (id, checksum, data, stored_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(checksum) DO NOTHING
            "#,
        )
        .bind(&candidate_id)
        .bind(checksum)
        .bind(bytes)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let is_new = inserted == 1;
        let blob_id: String = if is_new {
            candidate_id
        } else {
            sqlx::query_scalar("SELECT id FROM blobs WHERE checksum = ?")
                .bind(checksum)
                .fetch_one(&mut *tx)
                .await?
        };

        sqlx::query(
            r#"
            INSERT INTO metadata (blob_id, filename, mime, size, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(blob_id) DO UPDATE SET
                filename = excluded.filename,
                mime = excluded.mime,
                size = excluded.size,
                created_at = excluded.created_at
            "#,
        )
        .bind(&blob_id)
        .bind(&meta.filename)
        .bind(&meta.mime)
        .bind(meta.size)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(blob_id = %blob_id, is_new, "insert_or_reuse");
        Ok((blob_id, is_new))
    }

    /// Raw bytes of a blob
    pub async fn get_blob_bytes(&self, blob_id: &str) -> Result<Option<Vec<u8>>> {
        let bytes: Option<Vec<u8>> = sqlx::query_scalar("SELECT data FROM blobs WHERE id = ?")
            .bind(blob_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(bytes)
    }

    /// Delete a blob and everything keyed by it: metadata, text, and rows in
    /// every registered vector table.
    pub async fn delete_blob(&self, blob_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let tables: Vec<String> = sqlx::query_scalar("SELECT table_name FROM vector_tables")
            .fetch_all(&mut *tx)
            .await?;

        for table in tables {
            // Table names come from our own registry and are sanitized at
            // creation; identifiers cannot be bound as parameters.
            sqlx::query(&format!("DELETE FROM {} WHERE blob_id = ?", table))
                .bind(blob_id)
                .execute(&mut *tx)
                .await?;
        }

        // FK cascade removes metadata and texts.
        sqlx::query("DELETE FROM blobs WHERE id = ?")
            .bind(blob_id)
            .execute(&mut *tx)
            .await?;

        // One transaction: either the blob and every vector row go, or
        // nothing does.
        tx.commit().await?;
        Ok(())
    }

    // ===== Metadata Operations =====

    /// Insert or refresh metadata for a blob; the creation timestamp always
    /// records the most recent ingestion event.
    pub async fn upsert_meta(&self, blob_id: &str, meta: &FileMeta) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metadata (blob_id, filename, mime, size, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(blob_id) DO UPDATE SET
                filename = excluded.filename,
                mime = excluded.mime,
                size = excluded.size,
                created_at = excluded.created_at
            "#,
        )
        .bind(blob_id)
        .bind(&meta.filename)
        .bind(&meta.mime)
        .bind(meta.size)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get metadata for a blob
    pub async fn get_meta(&self, blob_id: &str) -> Result<Option<MetadataRecord>> {
        let meta = sqlx::query_as::<_, MetadataRecord>("SELECT * FROM metadata WHERE blob_id = ?")
            .bind(blob_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(meta)
    }

    // ===== Text Operations =====

    /// Partially update the text row for a blob.
    ///
    /// Only supplied fields are written; an empty update issues no write and
    /// does not touch the updated-at timestamp. Tags are deduplicated and
    /// stored order-insensitively.
    pub async fn upsert_text(&self, blob_id: &str, update: &TextUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let tags_json = match &update.tags {
            Some(tags) => {
                let mut tags: Vec<String> = tags.clone();
                tags.sort();
                tags.dedup();
                Some(serde_json::to_string(&tags)?)
            }
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO texts (blob_id, raw, refined, score, tags_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(blob_id) DO UPDATE SET
                raw = COALESCE(excluded.raw, texts.raw),
                refined = COALESCE(excluded.refined, texts.refined),
                score = COALESCE(excluded.score, texts.score),
                tags_json = COALESCE(excluded.tags_json, texts.tags_json),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(blob_id)
        .bind(&update.raw)
        .bind(&update.refined)
        .bind(update.score)
        .bind(&tags_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the text row for a blob
    pub async fn get_text(&self, blob_id: &str) -> Result<Option<TextRecord>> {
        let text = sqlx::query_as::<_, TextRecord>("SELECT * FROM texts WHERE blob_id = ?")
            .bind(blob_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(text)
    }

    // ===== Statistics =====

    /// Global row counts
    pub async fn global_stats(&self) -> Result<GlobalStats> {
        let blob_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blobs")
            .fetch_one(&self.pool)
            .await?;
        let text_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM texts")
            .fetch_one(&self.pool)
            .await?;
        let vector_table_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_tables")
            .fetch_one(&self.pool)
            .await?;

        Ok(GlobalStats {
            blob_count: blob_count as usize,
            text_count: text_count as usize,
            vector_table_count: vector_table_count as usize,
        })
    }
}
