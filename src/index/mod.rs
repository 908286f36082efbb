//! Vector storage for document chunks, one logical collection per knowledge
//! base.
//!
//! [`VectorBackend`] abstracts over similarity-search-capable stores;
//! [`VectorIndex`] binds a backend and an embedding client to a single
//! knowledge base's collection. Collections are created lazily on first
//! access and never shared across knowledge-base ids.
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │  VectorBackend   │
//!                  │   (async CRUD)   │
//!                  └────────┬─────────┘
//!                           │
//!               ┌───────────┴───────────┐
//!               ▼                       ▼
//!        ┌─────────────┐         ┌─────────────┐
//!        │   Memory    │         │   SQLite    │
//!        │  (RwLock)   │         │ sqlite-vec  │
//!        └─────────────┘         └─────────────┘
//! ```

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::clients::EmbeddingClient;
use crate::types::CoreError;

/// One stored chunk: a text span from a document plus its embedding and the
/// metadata tying it back to the originating file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique chunk identity; upserts are idempotent by this id.
    pub id: String,
    /// Chunk-group identifier shared by all chunks of one ingested document.
    pub group_id: String,
    /// Absolute path of the source file.
    pub file_path: String,
    /// Display name of the source file.
    pub file_name: String,
    /// Zero-based position of this chunk within the source.
    pub chunk_index: usize,
    /// The text span.
    pub content: String,
    /// Embedding vector, if computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        group_id: impl Into<String>,
        file_path: impl Into<String>,
        file_name: impl Into<String>,
        chunk_index: usize,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            group_id: group_id.into(),
            file_path: file_path.into(),
            file_name: file_name.into(),
            chunk_index,
            content: content.into(),
            embedding: None,
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A distinct ingested file inside a collection, deduplicated by group id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEntry {
    pub group_id: String,
    pub file_path: String,
    pub file_name: String,
}

/// One similarity-search match.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

/// Storage backend for chunk collections.
///
/// Implementations must create a collection lazily on first access, keep
/// upserts idempotent by chunk id, order search results by descending
/// similarity with ties broken by insertion order, and treat deletes with no
/// matches as no-ops.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn upsert(&self, collection: &str, chunks: Vec<ChunkRecord>) -> Result<(), CoreError>;

    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, CoreError>;

    /// Removes all chunks whose group id matches; returns how many were
    /// removed.
    async fn delete_group(&self, collection: &str, group_id: &str) -> Result<usize, CoreError>;

    /// Distinct ingested files, deduplicated by group id in insertion order.
    async fn list_groups(&self, collection: &str) -> Result<Vec<FileEntry>, CoreError>;

    async fn count(&self, collection: &str) -> Result<usize, CoreError>;
}

///// Collection naming convention: one collection per knowledge-base id.
#[must_use]
pub fn collection_name(knowledge_base_id: i64) -> String {
    format!("kb_{knowledge_base_id}_chunks")
}

/// A backend plus embedding client scoped to one knowledge base.
#[derive(Clone)]
pub struct VectorIndex {
    backend: Arc<dyn VectorBackend>,
    embedder: Arc<dyn EmbeddingClient>,
    collection: String,
}

impl VectorIndex {
    #[must_use]
    pub fn for_knowledge_base(
        backend: Arc<dyn VectorBackend>,
        embedder: Arc<dyn EmbeddingClient>,
        knowledge_base_id: i64,
    ) -> Self {
        Self {
            backend,
            embedder,
            collection: collection_name(knowledge_base_id),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Embeds any chunks missing an embedding, then upserts the batch.
    pub async fn upsert(&self, mut chunks: Vec<ChunkRecord>) -> Result<(), CoreError> {
        let missing: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| chunk.embedding.is_none())
            .map(|(idx, _)| idx)
            .collect();
        if !missing.is_empty() {
            let texts: Vec<String> = missing
                .iter()
                .map(|idx| chunks[*idx].content.clone())
                .collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != texts.len() {
                return Err(CoreError::Embedding(format!(
                    "requested {} embeddings, got {}",
                    texts.len(),
                    embeddings.len()
                )));
            }
            for (idx, embedding) in missing.into_iter().zip(embeddings) {
                chunks[idx].embedding = Some(embedding);
            }
        }
        self.backend.upsert(&self.collection, chunks).await
    }

    /// Embeds `query_text` and returns the `top_k` nearest chunks.
    pub async fn search(&self, query_text: &str, top_k: usize) -> Result<Vec<SearchHit>, CoreError> {
        let embeddings = self.embedder.embed_batch(&[query_text.to_string()]).await?;
        let query = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::Embedding("embedding service returned nothing".into()))?;
        self.backend.search(&self.collection, &query, top_k).await
    }

    /// Removes every chunk tagged with `group_id`; a no-op when nothing
    /// matches.
    pub async fn delete_where(&self, group_id: &str) -> Result<usize, CoreError> {
        self.backend.delete_group(&self.collection, group_id).await
    }

    /// Distinct ingested files in this collection.
    pub async fn list_distinct_files(&self) -> Result<Vec<FileEntry>, CoreError> {
        self.backend.list_groups(&self.collection).await
    }

    pub async fn count(&self) -> Result<usize, CoreError> {
        self.backend.count(&self.collection).await
    }
}
