//! Poppler `pdftotext` subprocess backend

use super::{validate_input, OcrEngine, OcrOutcome, ParameterSpec};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

const EXTENSIONS: &[&str] = &["pdf"];

/// Text-layer PDF extraction via poppler's `pdftotext`.
///
/// This is not optical recognition; it only reads embedded text. Scanned
/// PDFs without a text layer come back empty and should go to an image
/// engine instead.
pub struct PdfToTextEngine;

impl PdfToTextEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfToTextEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for PdfToTextEngine {
    fn id(&self) -> &str {
        "pdftotext"
    }

    fn name(&self) -> &str {
        "Poppler pdftotext"
    }

    fn extensions(&self) -> &[&str] {
        EXTENSIONS
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec {
                name: "layout",
                description: "Preserve the original physical layout",
                default: json!(true),
            },
            ParameterSpec {
                name: "first_page",
                description: "First page to extract (0 = from the start)",
                default: json!(0),
            },
            ParameterSpec {
                name: "last_page",
                description: "Last page to extract (0 = to the end)",
                default: json!(0),
            },
        ]
    }

    async fn probe(&self) -> Result<()> {
        let output = Command::new("pdftotext").arg("-v").output().await;
        match output {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => Err(Error::EngineUnavailable(format!(
                "pdftotext -v exited with {}",
                out.status
            ))),
            Err(e) => Err(Error::EngineUnavailable(format!(
                "pdftotext binary not found: {}",
                e
            ))),
        }
    }

    async fn process(&self, path: &Path, params: &Value) -> OcrOutcome {
        if let Some(reason) = validate_input(path, EXTENSIONS) {
            return OcrOutcome::failure(reason);
        }

        let mut cmd = Command::new("pdftotext");
        if params["layout"].as_bool().unwrap_or(true) {
            cmd.arg("-layout");
        }
        if let Some(first) = params["first_page"].as_i64().filter(|&p| p > 0) {
            cmd.args(["-f", &first.to_string()]);
        }
        if let Some(last) = params["last_page"].as_i64().filter(|&p| p > 0) {
            cmd.args(["-l", &last.to_string()]);
        }
        // "-" routes output to stdout.
        cmd.arg(path).arg("-");

        let started = Instant::now();
        match cmd.output().await {
            Ok(out) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout).into_owned();
                debug!(file = %path.display(), chars = text.len(), "pdftotext extraction complete");
                OcrOutcome::Success {
                    text,
                    elapsed: started.elapsed(),
                    confidence: None,
                }
            }
            Ok(out) => OcrOutcome::failure(format!(
                "pdftotext exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Err(e) => OcrOutcome::failure(format!("failed to spawn pdftotext: {}", e)),
        }
    }
}
