//! Tesseract subprocess backend

use super::{validate_input, OcrEngine, OcrOutcome, ParameterSpec};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp"];

/// Image OCR via the `tesseract` system binary
pub struct TesseractEngine;

impl TesseractEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn id(&self) -> &str {
        "tesseract"
    }

    fn name(&self) -> &str {
        "Tesseract OCR"
    }

    fn extensions(&self) -> &[&str] {
        EXTENSIONS
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec {
                name: "lang",
                description: "Language model(s), e.g. 'eng' or 'eng+deu'",
                default: json!("eng"),
            },
            ParameterSpec {
                name: "psm",
                description: "Page segmentation mode (0-13)",
                default: json!(3),
            },
            ParameterSpec {
                name: "oem",
                description: "OCR engine mode (0-3)",
                default: json!(3),
            },
        ]
    }

    async fn probe(&self) -> Result<()> {
        let output = Command::new("tesseract").arg("--version").output().await;
        match output {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => Err(Error::EngineUnavailable(format!(
                "tesseract --version exited with {}",
                out.status
            ))),
            Err(e) => Err(Error::EngineUnavailable(format!(
                "tesseract binary not found: {}",
                e
            ))),
        }
    }

    async fn process(&self, path: &Path, params: &Value) -> OcrOutcome {
        if let Some(reason) = validate_input(path, EXTENSIONS) {
            return OcrOutcome::failure(reason);
        }

        let lang = params["lang"].as_str().unwrap_or("eng").to_string();
        let psm = params["psm"].as_i64().unwrap_or(3);
        let oem = params["oem"].as_i64().unwrap_or(3);

        let started = Instant::now();
        let result = Command::new("tesseract")
            .arg(path)
            .arg("stdout")
            .args(["-l", &lang])
            .args(["--psm", &psm.to_string()])
            .args(["--oem", &oem.to_string()])
            .output()
            .await;

        match result {
            Ok(out) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout).into_owned();
                debug!(file = %path.display(), chars = text.len(), "Tesseract extraction complete");
                OcrOutcome::Success {
                    text,
                    elapsed: started.elapsed(),
                    confidence: None,
                }
            }
            Ok(out) => OcrOutcome::failure(format!(
                "tesseract exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Err(e) => OcrOutcome::failure(format!("failed to spawn tesseract: {}", e)),
        }
    }
}
