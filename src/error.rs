//! Custom error types for archivist

use thiserror::Error;

/// Main error type for archivist operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Refinement error: {0}")]
    Refine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Unknown OCR engine: {0}")]
    UnknownEngine(String),
}

/// Result type alias using archivist's Error
pub type Result<T> = std::result::Result<T, Error>;
