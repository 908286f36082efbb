//! Embedding client for an Ollama-style `/api/embed` endpoint.

use serde::Deserialize;
use serde_json::json;

use super::EmbeddingClient;
use crate::types::CoreError;

#[derive(Clone)]
pub struct OllamaEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Creates a client for `model` (e.g. `bge-m3`) against `base_url`
    /// (e.g. `http://localhost:11434`).
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait::async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(&json!({"model": self.model, "input": texts}))
            .send()
            .await
            .map_err(|err| CoreError::Embedding(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::Embedding(format!("{status}: {detail}")));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|err| CoreError::Embedding(err.to_string()))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(CoreError::Embedding(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(parsed.embeddings)
    }
}
