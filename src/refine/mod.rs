//! Text refinement
//!
//! A [`Refiner`] turns raw OCR output into cleaned-up text via an external
//! language-model service. Refinement is advisory: the quality gate in
//! [`quality`] decides whether the refined text is trusted or the raw
//! extraction is kept.

pub mod quality;

use crate::config::RefinerConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

pub use quality::{QualityDecision, QualityGate};

/// Result of one refinement call
#[derive(Debug, Clone)]
pub struct Refinement {
    pub refined: String,
    /// Language the service believes the text is in, if reported
    pub detected_language: Option<String>,
    pub elapsed: Duration,
}

/// A raw-text to refined-text service
#[async_trait]
pub trait Refiner: Send + Sync {
    async fn refine(&self, text: &str, language: &str) -> Result<Refinement>;
}

#[derive(Debug, Serialize)]
struct RefineRequest<'a> {
    text: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefineResponse {
    #[serde(alias = "text")]
    refined_text: String,
    #[serde(default)]
    detected_language: Option<String>,
}

/// [`Refiner`] backed by an HTTP service
pub struct HttpRefiner {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpRefiner {
    pub fn new(config: &RefinerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl Refiner for HttpRefiner {
    async fn refine(&self, text: &str, language: &str) -> Result<Refinement> {
        let started = Instant::now();
        let request = self
            .client
            .post(&self.url)
            .json(&RefineRequest { text, language })
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "refiner did not respond within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Refine(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Refine(e.to_string()))?;

        let parsed: RefineResponse = tokio::time::timeout(self.timeout, response.json())
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "refiner response stalled past {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Refine(format!("invalid refiner response: {}", e)))?;

        let elapsed = started.elapsed();
        debug!(
            chars_in = text.len(),
            chars_out = parsed.refined_text.len(),
            ?elapsed,
            "Refined text"
        );
        Ok(Refinement {
            refined: parsed.refined_text,
            detected_language: parsed.detected_language,
            elapsed,
        })
    }
}
