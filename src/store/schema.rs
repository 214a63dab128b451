//! SQLite schema definition

/// SQL schema for the archive database
pub const SCHEMA_SQL: &str = r#"
-- Blobs: immutable content-addressed binary storage
CREATE TABLE IF NOT EXISTS blobs (
    id TEXT PRIMARY KEY,
    checksum TEXT NOT NULL UNIQUE,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL
);

-- Metadata: one row per blob, refreshed on re-ingestion
CREATE TABLE IF NOT EXISTS metadata (
    blob_id TEXT PRIMARY KEY REFERENCES blobs(id) ON DELETE CASCADE,
    filename TEXT NOT NULL,
    mime TEXT NOT NULL,
    size INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Texts: extracted and refined text per blob
CREATE TABLE IF NOT EXISTS texts (
    blob_id TEXT PRIMARY KEY REFERENCES blobs(id) ON DELETE CASCADE,
    raw TEXT,
    refined TEXT,
    score REAL,
    tags_json TEXT,
    updated_at TEXT NOT NULL
);

-- Registry of dynamically created per-model vector tables
CREATE TABLE IF NOT EXISTS vector_tables (
    table_name TEXT PRIMARY KEY,
    model_key TEXT NOT NULL,
    dimension INTEGER NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_blobs_checksum ON blobs(checksum);
"#;
