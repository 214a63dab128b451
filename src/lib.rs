//! archivist: document ingestion and vectorization
//!
//! Stores files as content-addressed blobs in SQLite, extracts text through
//! pluggable OCR engines, refines it via an external language-model service,
//! chunks it with a lossless overlap scheme, and embeds the chunks with one
//! or more models into per-model vector tables.

pub mod chunk;
pub mod config;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod ocr;
pub mod refine;
pub mod store;

pub use chunk::Chunker;
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{IngestOrchestrator, IngestReport, ProgressEvent, Stage};
pub use ocr::{OcrOutcome, OcrRegistry};
pub use store::DocStore;
