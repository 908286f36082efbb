//! In-process vector backend for tests and embedded deployments.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{ChunkRecord, FileEntry, SearchHit, VectorBackend};
use crate::types::CoreError;

#[derive(Default)]
struct Collection {
    /// Chunk ids in insertion order; replacement keeps the original slot.
    order: Vec<String>,
    rows: FxHashMap<String, ChunkRecord>,
}

/// Vector backend holding all collections in memory behind an `RwLock`.
/// Searches may run concurrently with upserts and deletes from other tasks.
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<FxHashMap<String, Collection>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn upsert(&self, collection: &str, chunks: Vec<ChunkRecord>) -> Result<(), CoreError> {
        let mut collections = self.collections.write();
        let entry = collections.entry(collection.to_string()).or_default();
        for chunk in chunks {
            if !entry.rows.contains_key(&chunk.id) {
                entry.order.push(chunk.id.clone());
            }
            entry.rows.insert(chunk.id.clone(), chunk);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, CoreError> {
        let collections = self.collections.read();
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<SearchHit> = entry
            .order
            .iter()
            .filter_map(|id| entry.rows.get(id))
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                Some(SearchHit {
                    chunk: chunk.clone(),
                    score: cosine_similarity(embedding, query_embedding),
                })
            })
            .collect();
        // Stable sort keeps insertion order for equal scores.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_group(&self, collection: &str, group_id: &str) -> Result<usize, CoreError> {
        let mut collections = self.collections.write();
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = entry.rows.len();
        entry.rows.retain(|_, chunk| chunk.group_id != group_id);
        entry.order.retain(|id| entry.rows.contains_key(id));
        Ok(before - entry.rows.len())
    }

    async fn list_groups(&self, collection: &str) -> Result<Vec<FileEntry>, CoreError> {
        let collections = self.collections.read();
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut seen = rustc_hash::FxHashSet::default();
        let mut files = Vec::new();
        for chunk in entry.order.iter().filter_map(|id| entry.rows.get(id)) {
            if seen.insert(chunk.group_id.clone()) {
                files.push(FileEntry {
                    group_id: chunk.group_id.clone(),
                    file_path: chunk.file_path.clone(),
                    file_name: chunk.file_name.clone(),
                });
            }
        }
        Ok(files)
    }

    async fn count(&self, collection: &str) -> Result<usize, CoreError> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|entry| entry.rows.len())
            .unwrap_or(0))
    }
}

/// Cosine similarity; zero for empty, zero-norm, or mismatched vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
