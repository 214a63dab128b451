//! Embedding pipeline
//!
//! Chunks are embedded by every configured model and stored in that model's
//! vector table. Device selection decides batch size and the per-file chunk
//! cap; an accelerator run that dies with an out-of-memory error is retried
//! once on the CPU before the model is reported failed.

pub mod device;
pub mod http_backend;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::store::vectors::VectorStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use device::{pick_device, Device};
pub use http_backend::HttpEmbedder;

/// A text-to-vector model
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model key, also used to derive the vector table name
    fn model_name(&self) -> &str;

    /// Fixed output dimensionality
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build one [`HttpEmbedder`] per configured model
pub fn embedders_from_config(config: &EmbeddingConfig) -> Result<Vec<Arc<dyn Embedder>>> {
    config
        .models
        .iter()
        .map(|m| {
            Ok(Arc::new(HttpEmbedder::new(
                &config.backend_url,
                &m.key,
                m.dimension,
            )?) as Arc<dyn Embedder>)
        })
        .collect()
}

/// Embed texts in fixed-size batches, preserving input order
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        vectors.extend(embedder.embed(batch).await?);
    }
    Ok(vectors)
}

/// Outcome of one model's run over one blob's chunks
#[derive(Debug, Clone)]
pub struct ModelRunReport {
    pub model: String,
    pub table: String,
    pub rows: usize,
    pub device: Device,
    /// True when existing rows were kept and nothing was embedded
    pub skipped: bool,
}

/// Runs every configured model over a blob's chunks and persists the vectors
pub struct EmbeddingPipeline {
    vectors: VectorStore,
    config: EmbeddingConfig,
}

impl EmbeddingPipeline {
    pub fn new(vectors: VectorStore, config: EmbeddingConfig) -> Self {
        Self { vectors, config }
    }

    fn batch_size(&self, device: Device) -> usize {
        match device {
            Device::Accelerator => self.config.accelerator_batch_size,
            Device::Cpu => self.config.cpu_batch_size,
        }
    }

    /// CPU runs are capped; excess chunks are dropped with a warning rather
    /// than stalling the whole batch.
    fn capped<'a>(&self, chunks: &'a [String], device: Device, model: &str) -> &'a [String] {
        if device == Device::Cpu && chunks.len() > self.config.cpu_chunk_cap {
            warn!(
                model,
                total = chunks.len(),
                cap = self.config.cpu_chunk_cap,
                "CPU chunk cap exceeded; embedding only the first chunks"
            );
            &chunks[..self.config.cpu_chunk_cap]
        } else {
            chunks
        }
    }

    async fn run_model(
        &self,
        embedder: &dyn Embedder,
        blob_id: &str,
        chunks: &[String],
        device: Device,
    ) -> Result<ModelRunReport> {
        let model = embedder.model_name();
        let table = self
            .vectors
            .ensure_table(model, embedder.dimension())
            .await?;

        let chunks = self.capped(chunks, device, model);
        let vectors = embed_in_batches(embedder, chunks, self.batch_size(device)).await?;

        let rows: Vec<(String, Vec<f32>)> = chunks
            .iter()
            .cloned()
            .zip(vectors.into_iter())
            .collect();
        self.vectors.insert_embeddings(&table, blob_id, &rows).await?;

        Ok(ModelRunReport {
            model: model.to_string(),
            table,
            rows: rows.len(),
            device,
            skipped: false,
        })
    }

    /// Embed `chunks` with every embedder and store the vectors for `blob_id`.
    ///
    /// With `overwrite` set, existing rows for the blob are deleted first so
    /// the final row count is exactly the new chunk count; without it a blob
    /// that already has rows for a model is skipped for that model.
    pub async fn embed_and_store(
        &self,
        blob_id: &str,
        chunks: &[String],
        embedders: &[Arc<dyn Embedder>],
        device: Device,
        overwrite: bool,
    ) -> Result<Vec<ModelRunReport>> {
        let mut reports = Vec::with_capacity(embedders.len());

        for embedder in embedders {
            let model = embedder.model_name();
            let table = self
                .vectors
                .ensure_table(model, embedder.dimension())
                .await?;

            let existing = self.vectors.count_for_blob(&table, blob_id).await?;
            if existing > 0 {
                if overwrite {
                    let deleted = self.vectors.delete_for_blob(&table, blob_id).await?;
                    debug!(model, blob_id, deleted, "Overwriting existing embeddings");
                } else {
                    debug!(model, blob_id, existing, "Embeddings exist; skipping model");
                    reports.push(ModelRunReport {
                        model: model.to_string(),
                        table,
                        rows: existing,
                        device,
                        skipped: true,
                    });
                    continue;
                }
            }

            let report = match self.run_model(embedder.as_ref(), blob_id, chunks, device).await {
                Ok(report) => report,
                Err(Error::Embedding(msg))
                    if device == Device::Accelerator
                        && msg.to_lowercase().contains("out of memory") =>
                {
                    warn!(model, "Accelerator ran out of memory; retrying on CPU");
                    self.run_model(embedder.as_ref(), blob_id, chunks, Device::Cpu)
                        .await?
                }
                Err(e) => return Err(e),
            };

            info!(
                model = %report.model,
                rows = report.rows,
                device = %report.device,
                "Stored embeddings"
            );
            reports.push(report);
        }

        Ok(reports)
    }
}
