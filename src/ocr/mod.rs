//! Pluggable OCR engines
//!
//! An [`OcrEngine`] extracts text from one file. Engines self-describe their
//! parameters and supported extensions, and report availability through a
//! runtime probe so a missing system binary or unreachable service degrades
//! to "unavailable" instead of failing registration. The [`OcrRegistry`]
//! resolves the default engine, merges persisted settings with per-call
//! overrides, and enforces the wall-clock timeout.

pub mod ollama;
pub mod pdftotext;
pub mod settings;
pub mod tesseract;

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use settings::{deep_merge, SettingsStore};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use ollama::OllamaVisionEngine;
pub use pdftotext::PdfToTextEngine;
pub use settings::{OcrPreset, OcrSettings};
pub use tesseract::TesseractEngine;

/// One self-described engine parameter
#[derive(Debug, Clone, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub default: Value,
}

/// Result of one extraction attempt.
///
/// Extraction failure is a value, not an error: the caller decides whether a
/// failed file aborts a batch.
#[derive(Debug, Clone)]
pub enum OcrOutcome {
    Success {
        text: String,
        elapsed: Duration,
        confidence: Option<f32>,
    },
    Failure {
        reason: String,
    },
}

impl OcrOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// A text-extraction backend
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Stable identifier used in settings and presets
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Lowercase file extensions this engine accepts
    fn extensions(&self) -> &[&str];

    /// Self-described parameters with defaults
    fn parameters(&self) -> Vec<ParameterSpec>;

    /// Check whether the backing binary or service is reachable
    async fn probe(&self) -> Result<()>;

    /// Extract text from one file with fully merged parameters
    async fn process(&self, path: &Path, params: &Value) -> OcrOutcome;
}

/// Engine defaults as a parameter object, for settings merges
fn default_params(engine: &dyn OcrEngine) -> Value {
    let mut map = serde_json::Map::new();
    for spec in engine.parameters() {
        map.insert(spec.name.to_string(), spec.default);
    }
    Value::Object(map)
}

/// Reject a file the engine cannot process; `None` means it passed.
///
/// Shared by every engine so nonexistent files and unsupported extensions
/// never reach a subprocess or network call.
pub(crate) fn validate_input(path: &Path, extensions: &[&str]) -> Option<String> {
    if !path.exists() {
        return Some(format!("file not found: {}", path.display()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !extensions.contains(&ext.as_str()) {
        return Some(format!(
            "unsupported extension '{}' (expected one of {:?})",
            ext, extensions
        ));
    }
    None
}

/// Availability and parameter report for one engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub name: String,
    pub available: bool,
    /// Probe failure message when unavailable
    pub error: Option<String>,
    pub parameters: Vec<ParameterSpec>,
}

/// Ordered collection of engines plus persisted settings
pub struct OcrRegistry {
    engines: Vec<Arc<dyn OcrEngine>>,
    settings: SettingsStore,
}

impl OcrRegistry {
    pub fn new(settings: SettingsStore) -> Self {
        Self {
            engines: Vec::new(),
            settings,
        }
    }

    /// Registry with the built-in engines in preference order
    pub fn with_default_engines(settings: SettingsStore) -> Self {
        let mut registry = Self::new(settings);
        registry.register(Arc::new(TesseractEngine::new()));
        registry.register(Arc::new(PdfToTextEngine::new()));
        registry.register(Arc::new(OllamaVisionEngine::new(None)));
        registry
    }

    pub fn register(&mut self, engine: Arc<dyn OcrEngine>) {
        debug!(engine = engine.id(), "Registered OCR engine");
        self.engines.push(engine);
    }

    pub fn settings_store(&self) -> &SettingsStore {
        &self.settings
    }

    /// Engine instance by id
    pub fn create(&self, id: &str) -> Option<Arc<dyn OcrEngine>> {
        self.engines.iter().find(|e| e.id() == id).cloned()
    }

    /// Probe every registered engine.
    ///
    /// Probe failures are captured in the status, never propagated, so one
    /// broken backend cannot hide the others.
    pub async fn list_available(&self) -> HashMap<String, EngineStatus> {
        let mut statuses = HashMap::new();
        for engine in &self.engines {
            let (available, error) = match engine.probe().await {
                Ok(()) => (true, None),
                Err(e) => (false, Some(e.to_string())),
            };
            statuses.insert(
                engine.id().to_string(),
                EngineStatus {
                    name: engine.name().to_string(),
                    available,
                    error,
                    parameters: engine.parameters(),
                },
            );
        }
        statuses
    }

    /// Resolve the engine to use when none is named.
    ///
    /// Order: the configured default if it probes available, then the first
    /// registered engine that probes available, then the first registered
    /// engine regardless so the caller still gets a concrete failure from it.
    pub async fn default_engine(&self) -> Result<Arc<dyn OcrEngine>> {
        let configured = self.settings.load_settings().default_engine;

        if let Some(id) = &configured {
            match self.create(id) {
                Some(engine) => {
                    if engine.probe().await.is_ok() {
                        return Ok(engine);
                    }
                    warn!(engine = %id, "Configured default OCR engine unavailable; falling back");
                }
                None => {
                    warn!(engine = %id, "Configured default OCR engine not registered; falling back")
                }
            }
        }

        for engine in &self.engines {
            if engine.probe().await.is_ok() {
                info!(engine = engine.id(), "Selected available OCR engine");
                return Ok(engine.clone());
            }
        }

        self.engines
            .first()
            .cloned()
            .ok_or_else(|| Error::Config("no OCR engines registered".to_string()))
    }

    /// Fully merged parameters for one engine: defaults, then persisted
    /// settings, then per-call overrides.
    pub fn merged_params(&self, engine: &dyn OcrEngine, overrides: Option<&Value>) -> Value {
        let persisted = self.settings.load_settings().engine_params(engine.id());
        let merged = deep_merge(&default_params(engine), &persisted);
        match overrides {
            Some(over) => deep_merge(&merged, over),
            None => merged,
        }
    }

    /// Run one extraction with merged settings and the global timeout.
    ///
    /// `engine_id` of `None` uses the default-engine resolution order. An
    /// unknown id is a hard error; everything downstream of engine selection
    /// is reported as an [`OcrOutcome`].
    pub async fn process(
        &self,
        path: &Path,
        engine_id: Option<&str>,
        overrides: Option<&Value>,
    ) -> Result<OcrOutcome> {
        let engine = match engine_id {
            Some(id) => self
                .create(id)
                .ok_or_else(|| Error::UnknownEngine(id.to_string()))?,
            None => self.default_engine().await?,
        };

        if let Some(reason) = validate_input(path, engine.extensions()) {
            return Ok(OcrOutcome::failure(reason));
        }

        let params = self.merged_params(engine.as_ref(), overrides);
        let global = self.settings.load_settings().global;
        debug!(
            engine = engine.id(),
            file = %path.display(),
            timeout_secs = global.timeout_secs,
            max_retries = global.max_retries,
            "Running OCR"
        );

        // Each attempt gets the full timeout; transient failures are retried
        // up to the configured count before the failure is surfaced.
        let mut last = OcrOutcome::failure("no OCR attempts were made");
        for attempt in 0..=global.max_retries {
            let outcome = match tokio::time::timeout(
                Duration::from_secs(global.timeout_secs),
                engine.process(path, &params),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => OcrOutcome::failure(format!(
                    "OCR timed out after {}s on engine '{}'",
                    global.timeout_secs,
                    engine.id()
                )),
            };

            match outcome {
                OcrOutcome::Success { .. } => return Ok(outcome),
                OcrOutcome::Failure { ref reason } => {
                    if attempt < global.max_retries {
                        warn!(
                            engine = engine.id(),
                            attempt = attempt + 1,
                            %reason,
                            "OCR attempt failed; retrying"
                        );
                    }
                    last = outcome;
                }
            }
        }
        Ok(last)
    }
}
