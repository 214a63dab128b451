//! Ollama vision-model backend
//!
//! Sends the image to a local Ollama server as a base64 attachment on
//! `/api/generate` and treats the model response as the extracted text.
//! Useful for photographs and handwriting where classical OCR struggles.

use super::{validate_input, OcrEngine, OcrOutcome, ParameterSpec};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Image transcription via an Ollama vision model
pub struct OllamaVisionEngine {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaVisionEngine {
    /// `base_url` of `None` uses the standard local Ollama address.
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            // The registry owns the wall-clock timeout; no client timeout here.
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl OcrEngine for OllamaVisionEngine {
    fn id(&self) -> &str {
        "ollama-vision"
    }

    fn name(&self) -> &str {
        "Ollama Vision"
    }

    fn extensions(&self) -> &[&str] {
        EXTENSIONS
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec {
                name: "model",
                description: "Vision-capable model name",
                default: json!("llava"),
            },
            ParameterSpec {
                name: "prompt",
                description: "Instruction sent alongside the image",
                default: json!("Transcribe all text in this image exactly as written."),
            },
        ]
    }

    async fn probe(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::EngineUnavailable(format!("Ollama unreachable at {}: {}", url, e)))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::EngineUnavailable(format!(
                "Ollama returned {} from {}",
                response.status(),
                url
            )))
        }
    }

    async fn process(&self, path: &Path, params: &Value) -> OcrOutcome {
        if let Some(reason) = validate_input(path, EXTENSIONS) {
            return OcrOutcome::failure(reason);
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return OcrOutcome::failure(format!("failed to read image: {}", e)),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let model = params["model"].as_str().unwrap_or("llava");
        let prompt = params["prompt"]
            .as_str()
            .unwrap_or("Transcribe all text in this image exactly as written.");

        let body = json!({
            "model": model,
            "prompt": prompt,
            "images": [encoded],
            "stream": false,
        });

        let started = Instant::now();
        let response = match self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return OcrOutcome::failure(format!("Ollama request failed: {}", e)),
        };

        if !response.status().is_success() {
            return OcrOutcome::failure(format!(
                "Ollama returned {} for model '{}'",
                response.status(),
                model
            ));
        }

        match response.json::<GenerateResponse>().await {
            Ok(parsed) => {
                debug!(
                    file = %path.display(),
                    model,
                    chars = parsed.response.len(),
                    "Ollama vision extraction complete"
                );
                OcrOutcome::Success {
                    text: parsed.response,
                    elapsed: started.elapsed(),
                    confidence: None,
                }
            }
            Err(e) => OcrOutcome::failure(format!("invalid Ollama response: {}", e)),
        }
    }
}
