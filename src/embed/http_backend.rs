//! HTTP embedding backend client

use super::Embedder;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest {
    model: String,
    inputs: Vec<String>,
}

/// Response shapes accepted from embedding servers; different serving stacks
/// disagree on the field name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Embeddings { embeddings: Vec<Vec<f32>> },
    Vectors { vectors: Vec<Vec<f32>> },
    Data { data: Vec<EmbeddingData> },
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_embeddings(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingResponse::Embeddings { embeddings } => embeddings,
            EmbeddingResponse::Vectors { vectors } => vectors,
            EmbeddingResponse::Data { data } => data.into_iter().map(|d| d.embedding).collect(),
        }
    }
}

/// [`Embedder`] backed by an HTTP embedding server
pub struct HttpEmbedder {
    client: Client,
    url: String,
    model: String,
    dimension: usize,
    retries: usize,
}

impl HttpEmbedder {
    pub fn new(url: &str, model: &str, dimension: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Embedding(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
            model: model.to_string(),
            dimension,
            retries: 2,
        })
    }

    async fn send_with_retry(&self, request: &EmbedRequest) -> Result<EmbeddingResponse> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            match self.client.post(&self.url).json(request).send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => return Ok(ok.json::<EmbeddingResponse>().await.map_err(|e| {
                        Error::Embedding(format!("invalid embedding response: {}", e))
                    })?),
                    Err(e) => last_err = Some(Error::Embedding(e.to_string())),
                },
                Err(e) => last_err = Some(Error::Embedding(e.to_string())),
            }

            if attempt < self.retries {
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Embedding("embedding backend request failed".to_string())))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: self.model.clone(),
            inputs: texts.to_vec(),
        };
        let embeddings = self.send_with_retry(&request).await?.into_embeddings();

        if embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "backend returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|v| v.len() != self.dimension) {
            return Err(Error::Embedding(format!(
                "model '{}' returned dimension {}, expected {}",
                self.model,
                bad.len(),
                self.dimension
            )));
        }

        debug!(model = %self.model, inputs = texts.len(), "Embedded batch");
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_accepts_embeddings_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": "m"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[1.0, 2.0], [3.0, 4.0]]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&server.uri(), "m", 2).unwrap();
        let out = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[tokio::test]
    async fn test_embed_accepts_openai_data_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.5, 0.5]}]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&server.uri(), "m", 2).unwrap();
        let out = embedder.embed(&["a".to_string()]).await.unwrap();
        assert_eq!(out, vec![vec![0.5, 0.5]]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[1.0, 2.0, 3.0]]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&server.uri(), "m", 2).unwrap();
        let err = embedder
            .embed(&["a".to_string()])
            .await
            .expect_err("3-element vector against declared dimension 2");
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "vectors": [[1.0]]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&server.uri(), "m", 1).unwrap();
        let out = embedder.embed(&["a".to_string()]).await.unwrap();
        assert_eq!(out, vec![vec![1.0]]);
    }
}
