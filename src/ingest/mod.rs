//! Document ingestion: load a source file, split it into overlapping chunks,
//! embed them, and upsert the batch into a knowledge base's vector index.
//!
//! Every ingested file gets a fresh chunk-group id (a UUID) stamped on all of
//! its chunks, so later removal of that file is a single group delete.

use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

use crate::index::{ChunkRecord, VectorIndex};
use crate::types::CoreError;

pub mod loader;
pub mod splitter;

pub use splitter::Splitter;

/// Source content classification, with the numeric codes used by callers that
/// store the kind in relational rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Pdf,
    Word,
    Other,
}

impl ContentKind {
    pub fn code(self) -> u8 {
        match self {
            ContentKind::Text => 1,
            ContentKind::Pdf => 2,
            ContentKind::Word => 3,
            ContentKind::Other => 4,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ContentKind::Text,
            2 => ContentKind::Pdf,
            3 => ContentKind::Word,
            _ => ContentKind::Other,
        }
    }

    /// Classifies by file extension, case-insensitive.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("txt") => ContentKind::Text,
            Some("pdf") => ContentKind::Pdf,
            Some("doc" | "docx") => ContentKind::Word,
            _ => ContentKind::Other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Pdf => "pdf",
            ContentKind::Word => "word",
            ContentKind::Other => "other",
        }
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub group_id: String,
    pub chunk_count: usize,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    index: VectorIndex,
    splitter: Splitter,
}

impl IngestionPipeline {
    pub fn new(index: VectorIndex, splitter: Splitter) -> Self {
        Self { index, splitter }
    }

    /// Runs the full pipeline for one file. Returns the chunk-group id that
    /// identifies the file's chunks in the index.
    ///
    /// If the upsert fails after chunks were staged, a best-effort delete of
    /// the group id is attempted so no partial batch lingers.
    pub async fn ingest(&self, path: &Path, kind: ContentKind) -> Result<IngestReport, CoreError> {
        let text = loader::load_text(path, kind).await?;
        let chunks = self.splitter.split(&text);
        if chunks.is_empty() {
            return Err(CoreError::Ingestion(format!(
                "'{}' produced no chunks",
                path.display()
            )));
        }

        let group_id = Uuid::new_v4().to_string();
        let file_path = path.display().to_string();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&file_path)
            .to_string();

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| {
                ChunkRecord::new(
                    Uuid::new_v4().to_string(),
                    group_id.clone(),
                    file_path.clone(),
                    file_name.clone(),
                    chunk_index,
                    content,
                )
            })
            .collect();
        let chunk_count = records.len();

        if let Err(err) = self.index.upsert(records).await {
            warn!(group_id = %group_id, error = %err, "ingestion upsert failed, cleaning up group");
            if let Err(cleanup_err) = self.index.delete_where(&group_id).await {
                warn!(group_id = %group_id, error = %cleanup_err, "cleanup delete failed");
            }
            return Err(CoreError::Ingestion(format!(
                "failed to index '{file_name}': {err}"
            )));
        }

        info!(group_id = %group_id, chunks = chunk_count, file = %file_name, "ingested document");
        Ok(IngestReport {
            group_id,
            chunk_count,
        })
    }
}
