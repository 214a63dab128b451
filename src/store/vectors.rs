//! Per-model vector tables
//!
//! Each (model, dimension) pair gets its own SQLite table named
//! `embedding_<model>_<dim>`, created on demand and recorded in the
//! `vector_tables` registry. A table's dimensionality is fixed at creation
//! and enforced on every insert. Vectors are stored as little-endian f32
//! byte strings.

use crate::error::{Error, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

/// One chunk/vector row read back from a vector table
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: String,
    pub content: String,
    pub vector: Vec<f32>,
    pub blob_id: String,
}

/// Serialize a vector as little-endian f32 bytes
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Deserialize little-endian f32 bytes back into a vector
pub fn blob_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Derive the table name for a (model, dimension) pair.
///
/// Path-unsafe characters in the model key are normalized to underscores so
/// the name is a valid SQL identifier.
pub fn table_name(model_key: &str, dimension: usize) -> String {
    let sanitized: String = model_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("embedding_{}_{}", sanitized, dimension)
}

/// Handle over the per-model vector tables
#[derive(Clone)]
pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensure the vector table for a model exists and return its name.
    ///
    /// Fails if the registry already holds the same table name with a
    /// different dimensionality.
    pub async fn ensure_table(&self, model_key: &str, dimension: usize) -> Result<String> {
        let name = table_name(model_key, dimension);

        let registered: Option<i64> =
            sqlx::query_scalar("SELECT dimension FROM vector_tables WHERE table_name = ?")
                .bind(&name)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(existing) = registered {
            if existing as usize != dimension {
                return Err(Error::Validation(format!(
                    "vector table '{}' was created with dimension {}, requested {}",
                    name, existing, dimension
                )));
            }
            return Ok(name);
        }

        info!(table = %name, dimension, "Creating vector table");

        // The name is sanitized above; identifiers cannot be bound.
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                vector BLOB NOT NULL,
                blob_id TEXT NOT NULL REFERENCES blobs(id)
            )
            "#,
            name
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_blob ON {} (blob_id)",
            name, name
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO vector_tables (table_name, model_key, dimension) VALUES (?, ?, ?)",
        )
        .bind(&name)
        .bind(model_key)
        .bind(dimension as i64)
        .execute(&self.pool)
        .await?;

        Ok(name)
    }

    /// Registered dimensionality of a table
    pub async fn table_dimension(&self, table: &str) -> Result<usize> {
        let dim: Option<i64> =
            sqlx::query_scalar("SELECT dimension FROM vector_tables WHERE table_name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;
        dim.map(|d| d as usize)
            .ok_or_else(|| Error::Validation(format!("unknown vector table '{}'", table)))
    }

    /// Bulk-insert chunk/vector rows for a blob.
    ///
    /// Every vector must match the table's declared dimensionality exactly;
    /// a mismatch fails the whole insert rather than truncating or padding.
    pub async fn insert_embeddings(
        &self,
        table: &str,
        blob_id: &str,
        rows: &[(String, Vec<f32>)],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let dimension = self.table_dimension(table).await?;
        if let Some((_, bad)) = rows.iter().find(|(_, v)| v.len() != dimension) {
            return Err(Error::Validation(format!(
                "vector dimension mismatch for table '{}': expected {}, got {}",
                table,
                dimension,
                bad.len()
            )));
        }

        let mut tx = self.pool.begin().await?;
        for (content, vector) in rows {
            sqlx::query(&format!(
                "INSERT INTO {} (id, content, vector, blob_id) VALUES (?, ?, ?, ?)",
                table
            ))
            .bind(Uuid::new_v4().to_string())
            .bind(content)
            .bind(vector_to_blob(vector))
            .bind(blob_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(table, blob_id, rows = rows.len(), "Inserted embeddings");
        Ok(rows.len())
    }

    /// Delete all rows for a blob in one table; returns the deleted count
    pub async fn delete_for_blob(&self, table: &str, blob_id: &str) -> Result<usize> {
        let deleted = sqlx::query(&format!("DELETE FROM {} WHERE blob_id = ?", table))
            .bind(blob_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted as usize)
    }

    /// Count rows for a blob in one table
    pub async fn count_for_blob(&self, table: &str, blob_id: &str) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE blob_id = ?", table))
                .bind(blob_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    /// Read back all rows for a blob in one table
    pub async fn get_for_blob(&self, table: &str, blob_id: &str) -> Result<Vec<EmbeddingRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT id, content, vector, blob_id FROM {} WHERE blob_id = ?",
            table
        ))
        .bind(blob_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| EmbeddingRecord {
                id: row.get("id"),
                content: row.get("content"),
                vector: blob_to_vector(&row.get::<Vec<u8>, _>("vector")),
                blob_id: row.get("blob_id"),
            })
            .collect())
    }

    /// List registered vector tables as (table_name, model_key, dimension)
    pub async fn list_tables(&self) -> Result<Vec<(String, String, usize)>> {
        let rows = sqlx::query("SELECT table_name, model_key, dimension FROM vector_tables")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get("table_name"),
                    row.get("model_key"),
                    row.get::<i64, _>("dimension") as usize,
                )
            })
            .collect())
    }
}
