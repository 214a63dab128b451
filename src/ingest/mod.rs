//! Ingestion orchestrator
//!
//! Drives each file through the full pipeline: store the blob, extract text,
//! refine it, gate the refinement, chunk, embed, persist. Files are
//! processed concurrently up to the configured pool size; per-file failures
//! are reported as events and never abort the batch. Cancellation is checked
//! between stages, so a cancelled batch stops quickly but never leaves a
//! stage half-applied.

use crate::chunk::Chunker;
use crate::config::{Config, IngestConfig};
use crate::embed::{pick_device, Embedder, EmbeddingPipeline};
use crate::error::{Error, Result};
use crate::ocr::{OcrOutcome, OcrRegistry};
use crate::refine::{QualityGate, Refiner};
use crate::store::{compute_checksum, DocStore, FileMeta, TextUpdate};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pipeline stage a file is in when an event is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Extracting,
    Refining,
    Scoring,
    Chunking,
    Embedding,
    Persisted,
    Failed,
    Cancelled,
}

/// One progress event for one file
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    /// Zero-based position of the file in the batch
    pub index: usize,
    pub total: usize,
    pub file: String,
    pub stage: Stage,
    /// Stage-specific payload
    pub detail: Value,
}

/// Aggregate outcome of one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Files whose content was already stored under another name
    pub deduplicated: usize,
}

struct Inner {
    store: DocStore,
    registry: OcrRegistry,
    refiner: Arc<dyn Refiner>,
    embedders: Vec<Arc<dyn Embedder>>,
    pipeline: EmbeddingPipeline,
    chunker: Chunker,
    gate: QualityGate,
    ingest: IngestConfig,
    target_language: String,
    min_free_memory_mb: u64,
    cancel: CancellationToken,
}

/// Batch ingestion driver
#[derive(Clone)]
pub struct IngestOrchestrator {
    inner: Arc<Inner>,
}

impl IngestOrchestrator {
    pub fn new(
        config: &Config,
        store: DocStore,
        registry: OcrRegistry,
        refiner: Arc<dyn Refiner>,
        embedders: Vec<Arc<dyn Embedder>>,
    ) -> Result<Self> {
        let chunker = Chunker::from_config(&config.chunk)?;
        let pipeline = EmbeddingPipeline::new(store.vectors(), config.embedding.clone());
        let gate = QualityGate::from_config(&config.refiner);
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                registry,
                refiner,
                embedders,
                pipeline,
                chunker,
                gate,
                ingest: config.ingest.clone(),
                target_language: config.refiner.target_language.clone(),
                min_free_memory_mb: config.embedding.min_free_memory_mb,
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Token that stops the batch between stages when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Start a batch; progress arrives on the returned channel.
    ///
    /// The batch runs on the runtime independently of the receiver, so a
    /// dropped receiver does not stop processing.
    pub fn ingest(&self, files: Vec<PathBuf>) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(64);
        let total = files.len();
        let this = self.clone();

        tokio::spawn(async move {
            let pool = this.inner.ingest.pool_size.max(1);
            stream::iter(files.into_iter().enumerate())
                .map(|(index, path)| {
                    let this = this.clone();
                    let tx = tx.clone();
                    async move {
                        this.process_file(index, total, path, &tx).await;
                    }
                })
                .buffer_unordered(pool)
                .collect::<Vec<()>>()
                .await;
        });

        rx
    }

    /// Run a batch to completion and fold the events into a report
    pub async fn ingest_and_collect(&self, files: Vec<PathBuf>) -> IngestReport {
        let mut report = IngestReport {
            total: files.len(),
            ..Default::default()
        };
        let mut rx = self.ingest(files);
        while let Some(event) = rx.recv().await {
            match event.stage {
                Stage::Persisted => {
                    report.succeeded += 1;
                    if event.detail["deduplicated"].as_bool() == Some(true) {
                        report.deduplicated += 1;
                    }
                }
                Stage::Failed => report.failed += 1,
                Stage::Cancelled => report.cancelled += 1,
                _ => {}
            }
        }
        report
    }

    async fn process_file(
        &self,
        index: usize,
        total: usize,
        path: PathBuf,
        tx: &mpsc::Sender<ProgressEvent>,
    ) {
        let inner = &self.inner;
        let file = path.display().to_string();
        let emit = |stage: Stage, detail: Value| {
            let event = ProgressEvent {
                index,
                total,
                file: file.clone(),
                stage,
                detail,
            };
            async move {
                // A dropped receiver only drops reporting.
                let _ = tx.send(event).await;
            }
        };

        macro_rules! check_cancelled {
            () => {
                if inner.cancel.is_cancelled() {
                    emit(Stage::Cancelled, Value::Null).await;
                    return;
                }
            };
        }

        check_cancelled!();
        emit(Stage::Queued, Value::Null).await;

        // Validate and store the blob before any extraction work.
        let (blob_id, is_new) = match self.store_blob(&path).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(file = %file, error = %e, "Ingest failed before extraction");
                emit(Stage::Failed, json!({"error": e.to_string(), "during": "queued"})).await;
                return;
            }
        };

        // A re-ingested blob with persisted text skips straight to chunking
        // unless embeddings are being rebuilt anyway.
        let reused_text = if !is_new && !inner.ingest.overwrite_embeddings {
            match inner.store.get_text(&blob_id).await {
                Ok(Some(record)) => record.refined,
                _ => None,
            }
        } else {
            None
        };

        let text = match reused_text {
            Some(text) => {
                info!(file = %file, blob_id = %blob_id, "Reusing stored text for duplicate blob");
                text
            }
            None => {
                check_cancelled!();
                emit(Stage::Extracting, json!({"blob_id": blob_id})).await;
                let raw = match inner.registry.process(&path, None, None).await {
                    Ok(OcrOutcome::Success { text, elapsed, .. }) => {
                        info!(file = %file, ?elapsed, "Extraction complete");
                        text
                    }
                    Ok(OcrOutcome::Failure { reason }) => {
                        emit(Stage::Failed, json!({"error": reason, "during": "extracting"}))
                            .await;
                        return;
                    }
                    Err(e) => {
                        emit(
                            Stage::Failed,
                            json!({"error": e.to_string(), "during": "extracting"}),
                        )
                        .await;
                        return;
                    }
                };

                check_cancelled!();
                emit(Stage::Refining, Value::Null).await;
                let refinement = match inner.refiner.refine(&raw, &inner.target_language).await {
                    Ok(refinement) => refinement,
                    Err(e) => {
                        emit(
                            Stage::Failed,
                            json!({"error": e.to_string(), "during": "refining"}),
                        )
                        .await;
                        return;
                    }
                };

                check_cancelled!();
                emit(Stage::Scoring, Value::Null).await;
                let decision = inner.gate.evaluate(&raw, &refinement);
                let update = TextUpdate {
                    raw: Some(raw),
                    refined: Some(decision.text.clone()),
                    score: Some(decision.score as f64),
                    tags: None,
                };
                if let Err(e) = inner.store.upsert_text(&blob_id, &update).await {
                    emit(
                        Stage::Failed,
                        json!({"error": e.to_string(), "during": "scoring"}),
                    )
                    .await;
                    return;
                }
                decision.text
            }
        };

        check_cancelled!();
        let chunks = inner.chunker.split(&text);
        emit(Stage::Chunking, json!({"chunks": chunks.len()})).await;

        check_cancelled!();
        emit(Stage::Embedding, json!({"models": inner.embedders.len()})).await;
        let device = pick_device(inner.min_free_memory_mb).await;
        let reports = match inner
            .pipeline
            .embed_and_store(
                &blob_id,
                &chunks,
                &inner.embedders,
                device,
                inner.ingest.overwrite_embeddings,
            )
            .await
        {
            Ok(reports) => reports,
            Err(e) => {
                emit(
                    Stage::Failed,
                    json!({"error": e.to_string(), "during": "embedding"}),
                )
                .await;
                return;
            }
        };

        let rows: usize = reports.iter().map(|r| r.rows).sum();
        info!(file = %file, blob_id = %blob_id, chunks = chunks.len(), rows, "File persisted");
        emit(
            Stage::Persisted,
            json!({
                "blob_id": blob_id,
                "deduplicated": !is_new,
                "chunks": chunks.len(),
                "embedding_rows": rows,
            }),
        )
        .await;
    }

    /// Validate the file and store its content, returning (blob_id, is_new)
    async fn store_blob(&self, path: &PathBuf) -> Result<(String, bool)> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::Validation(format!("cannot read {}: {}", path.display(), e)))?;
        if !meta.is_file() {
            return Err(Error::Validation(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        if meta.len() > self.inner.ingest.max_file_bytes {
            return Err(Error::Validation(format!(
                "{} is {} bytes, over the {} byte limit",
                path.display(),
                meta.len(),
                self.inner.ingest.max_file_bytes
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        let checksum = compute_checksum(&bytes);
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        self.inner
            .store
            .insert_or_reuse(
                &bytes,
                &checksum,
                &FileMeta {
                    filename,
                    mime,
                    size: bytes.len() as i64,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkConfig, EmbeddingModelConfig};
    use crate::error::Result;
    use crate::ocr::settings::SettingsStore;
    use crate::ocr::{OcrEngine, ParameterSpec};
    use crate::refine::Refinement;
    use crate::store::vectors::table_name;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Reads the file verbatim; stands in for a real OCR backend.
    struct PlainTextEngine;

    #[async_trait]
    impl OcrEngine for PlainTextEngine {
        fn id(&self) -> &str {
            "plain"
        }

        fn name(&self) -> &str {
            "Plain Text"
        }

        fn extensions(&self) -> &[&str] {
            &["txt"]
        }

        fn parameters(&self) -> Vec<ParameterSpec> {
            Vec::new()
        }

        async fn probe(&self) -> Result<()> {
            Ok(())
        }

        async fn process(&self, path: &Path, _params: &Value) -> OcrOutcome {
            match std::fs::read_to_string(path) {
                Ok(text) => OcrOutcome::Success {
                    text,
                    elapsed: Duration::ZERO,
                    confidence: None,
                },
                Err(e) => OcrOutcome::failure(e.to_string()),
            }
        }
    }

    /// Returns its input unchanged
    struct EchoRefiner;

    #[async_trait]
    impl Refiner for EchoRefiner {
        async fn refine(&self, text: &str, _language: &str) -> Result<Refinement> {
            Ok(Refinement {
                refined: text.to_string(),
                detected_language: Some("en".to_string()),
                elapsed: Duration::ZERO,
            })
        }
    }

    struct FailingRefiner;

    #[async_trait]
    impl Refiner for FailingRefiner {
        async fn refine(&self, _text: &str, _language: &str) -> Result<Refinement> {
            Err(Error::Timeout("refiner did not respond within 1s".to_string()))
        }
    }

    struct UnitEmbedder {
        dimension: usize,
    }

    #[async_trait]
    impl Embedder for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; self.dimension]).collect())
        }
    }

    fn test_config(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.chunk = ChunkConfig {
            chunk_size: 500,
            overlap: 50,
        };
        config.embedding.models = vec![EmbeddingModelConfig {
            key: "unit".to_string(),
            dimension: 4,
        }];
        config.ingest.pool_size = 2;
        config.paths.base_dir = tmp.path().to_path_buf();
        config
    }

    async fn orchestrator(
        tmp: &TempDir,
        refiner: Arc<dyn Refiner>,
    ) -> (IngestOrchestrator, DocStore) {
        let config = test_config(tmp);
        let store = DocStore::new(&tmp.path().join("archive.db")).await.unwrap();
        let settings = SettingsStore::new(
            tmp.path().join("ocr_settings.json"),
            tmp.path().join("ocr_presets.json"),
        );
        let mut registry = OcrRegistry::new(settings);
        registry.register(Arc::new(PlainTextEngine));
        let embedders: Vec<Arc<dyn Embedder>> = vec![Arc::new(UnitEmbedder { dimension: 4 })];
        let orchestrator =
            IngestOrchestrator::new(&config, store.clone(), registry, refiner, embedders).unwrap();
        (orchestrator, store)
    }

    fn write_sample(tmp: &TempDir, name: &str, chars: usize) -> PathBuf {
        let text: String = "lorem ipsum dolor sit amet consectetur adipiscing elit "
            .repeat(1 + chars / 55)
            .chars()
            .take(chars)
            .collect();
        let path = tmp.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[tokio::test]
    async fn test_end_to_end_single_file() {
        let tmp = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(&tmp, Arc::new(EchoRefiner)).await;
        let path = write_sample(&tmp, "doc.txt", 1200);

        let mut rx = orchestrator.ingest(vec![path]);
        let mut stages = Vec::new();
        let mut blob_id = String::new();
        while let Some(event) = rx.recv().await {
            if event.stage == Stage::Persisted {
                blob_id = event.detail["blob_id"].as_str().unwrap().to_string();
                // 1,200 chars at 500/50 chunking.
                assert_eq!(event.detail["chunks"], 3);
                assert_eq!(event.detail["deduplicated"], false);
            }
            stages.push(event.stage);
        }

        assert_eq!(
            stages,
            vec![
                Stage::Queued,
                Stage::Extracting,
                Stage::Refining,
                Stage::Scoring,
                Stage::Chunking,
                Stage::Embedding,
                Stage::Persisted,
            ]
        );

        let text = store.get_text(&blob_id).await.unwrap().unwrap();
        assert!(text.raw.is_some());
        assert!(text.score.unwrap() > 0.0);

        let table = table_name("unit", 4);
        assert_eq!(store.vectors().count_for_blob(&table, &blob_id).await.unwrap(), 3);
    }

    /// Answers with model boilerplate instead of refined content
    struct TemplateRefiner;

    #[async_trait]
    impl Refiner for TemplateRefiner {
        async fn refine(&self, _text: &str, _language: &str) -> Result<Refinement> {
            Ok(Refinement {
                refined: "Certainly, here is the reformatted text you asked for.".to_string(),
                detected_language: Some("en".to_string()),
                elapsed: Duration::ZERO,
            })
        }
    }

    #[tokio::test]
    async fn test_template_refinement_persists_raw_text() {
        let tmp = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(&tmp, Arc::new(TemplateRefiner)).await;
        let path = write_sample(&tmp, "doc.txt", 400);
        let raw = std::fs::read_to_string(&path).unwrap();

        let mut rx = orchestrator.ingest(vec![path]);
        let mut blob_id = String::new();
        while let Some(event) = rx.recv().await {
            assert_ne!(event.stage, Stage::Failed);
            if event.stage == Stage::Persisted {
                blob_id = event.detail["blob_id"].as_str().unwrap().to_string();
            }
        }

        // The gate rejected the boilerplate, so the raw extraction is what
        // got stored and scored, not the template answer.
        let text = store.get_text(&blob_id).await.unwrap().unwrap();
        assert_eq!(text.refined.as_deref(), Some(raw.as_str()));
        assert_eq!(text.raw.as_deref(), Some(raw.as_str()));
        assert!(!text.refined.unwrap().to_lowercase().contains("certainly"));
        assert!(text.score.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let tmp = TempDir::new().unwrap();
        let (orchestrator, _store) = orchestrator(&tmp, Arc::new(EchoRefiner)).await;
        let good = write_sample(&tmp, "good.txt", 300);
        let missing = tmp.path().join("missing.txt");

        let report = orchestrator.ingest_and_collect(vec![missing, good]).await;
        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_refiner_timeout_fails_only_that_file() {
        let tmp = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(&tmp, Arc::new(FailingRefiner)).await;
        let path = write_sample(&tmp, "doc.txt", 300);

        let mut rx = orchestrator.ingest(vec![path]);
        let mut failed_detail = Value::Null;
        while let Some(event) = rx.recv().await {
            if event.stage == Stage::Failed {
                failed_detail = event.detail;
            }
        }
        assert_eq!(failed_detail["during"], "refining");

        // The blob was stored before refinement; no text row was written.
        let stats = store.global_stats().await.unwrap();
        assert_eq!(stats.blob_count, 1);
        assert_eq!(stats.text_count, 0);
    }

    #[tokio::test]
    async fn test_duplicate_ingest_reuses_blob_and_text() {
        let tmp = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(&tmp, Arc::new(EchoRefiner)).await;
        let first = write_sample(&tmp, "a.txt", 400);

        let report = orchestrator.ingest_and_collect(vec![first]).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.deduplicated, 0);

        // Same bytes under a new name dedupe to the same blob.
        let second = write_sample(&tmp, "b.txt", 400);
        let report = orchestrator.ingest_and_collect(vec![second]).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.deduplicated, 1);

        let stats = store.global_stats().await.unwrap();
        assert_eq!(stats.blob_count, 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_remaining_files() {
        let tmp = TempDir::new().unwrap();
        let (orchestrator, _store) = orchestrator(&tmp, Arc::new(EchoRefiner)).await;
        let files: Vec<PathBuf> = (0..6)
            .map(|i| write_sample(&tmp, &format!("f{}.txt", i), 200))
            .collect();

        orchestrator.cancel_token().cancel();
        let report = orchestrator.ingest_and_collect(files).await;
        assert_eq!(report.cancelled, 6);
        assert_eq!(report.succeeded, 0);
    }
}
