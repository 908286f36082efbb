//! Deterministic embedding client for tests and offline runs.

use super::EmbeddingClient;
use crate::types::CoreError;

/// Hash-bucket embedder: each character contributes to one dimension, so
/// identical texts embed identically and texts sharing vocabulary land close
/// together under cosine similarity. No network, no model weights.
#[derive(Clone, Debug)]
pub struct MockEmbeddingClient {
    dim: usize,
}

impl Default for MockEmbeddingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbeddingClient {
    #[must_use]
    pub fn new() -> Self {
        Self { dim: 32 }
    }

    #[must_use]
    pub fn with_dim(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for ch in text.chars().filter(|ch| !ch.is_whitespace()) {
            let bucket = (ch as usize) % self.dim;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait::async_trait]
impl EmbeddingClient for MockEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}
