//! Facade tying the pieces together for the CRUD layer that owns the
//! relational rows: documents in, turns out.

use std::path::Path;
use std::sync::Arc;

use tracing::instrument;

use crate::clients::{EmbeddingClient, OllamaEmbeddingClient};
use crate::config::EngineConfig;
use crate::index::{FileEntry, VectorBackend, VectorIndex};
use crate::ingest::{ContentKind, IngestReport, IngestionPipeline, Splitter};
use crate::message::Message;
use crate::orchestrator::Orchestrator;
use crate::registry::{ModelEntry, ModelRegistry, OpenAiClientFactory};
use crate::retrieval::RetrieveTool;
use crate::streaming::{DeliveryPipeline, DeliveryStream};
use crate::types::CoreError;

pub use crate::streaming::TurnSink;

/// The conversation core behind one deployment's CRUD layer.
///
/// Holds no conversation state of its own; history, conversation ids, and
/// model rows stay with the caller. Knowledge bases are addressed by id and
/// materialize as vector-index collections on first use.
pub struct ChatEngine {
    config: EngineConfig,
    registry: ModelRegistry,
    backend: Arc<dyn VectorBackend>,
    embedder: Arc<dyn EmbeddingClient>,
    delivery: DeliveryPipeline,
}

impl ChatEngine {
    pub fn new(
        config: EngineConfig,
        registry: ModelRegistry,
        backend: Arc<dyn VectorBackend>,
        embedder: Arc<dyn EmbeddingClient>,
        sink: Arc<dyn TurnSink>,
    ) -> Self {
        Self {
            config,
            registry,
            backend,
            embedder,
            delivery: DeliveryPipeline::new(sink),
        }
    }

    /// Wires production clients from `config`: an OpenAI-compatible chat
    /// client factory and an Ollama embedding client against the configured
    /// endpoints. Register models with [`ChatEngine::register_model`].
    pub fn from_config(
        config: EngineConfig,
        backend: Arc<dyn VectorBackend>,
        sink: Arc<dyn TurnSink>,
    ) -> Self {
        let factory = OpenAiClientFactory::new(&config.chat_base_url, config.chat_api_key.clone());
        let embedder = Arc::new(OllamaEmbeddingClient::new(
            &config.embedding_base_url,
            &config.embedding_model,
        ));
        Self::new(
            config,
            ModelRegistry::new(Arc::new(factory)),
            backend,
            embedder,
            sink,
        )
    }

    /// Adds (or replaces) a row of the model table.
    pub fn register_model(&mut self, entry: ModelEntry) {
        self.registry.register(entry);
    }

    fn index_for(&self, knowledge_base_id: i64) -> VectorIndex {
        VectorIndex::for_knowledge_base(
            Arc::clone(&self.backend),
            Arc::clone(&self.embedder),
            knowledge_base_id,
        )
    }

    fn orchestrator(
        &self,
        model_id: i64,
        knowledge_base_id: Option<i64>,
    ) -> Result<Orchestrator, CoreError> {
        let chat = self.registry.resolve(model_id)?;
        let orchestrator = Orchestrator::new(chat, self.config.persona.clone());
        Ok(match knowledge_base_id {
            Some(kb_id) => orchestrator.with_tool(RetrieveTool::new(
                self.index_for(kb_id),
                self.config.retrieval_top_k,
            )),
            None => orchestrator,
        })
    }

    /// Ingests one source file into a knowledge base, returning the chunk
    /// group id the caller stores on its Document row.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn ingest(
        &self,
        path: impl AsRef<Path>,
        kind: ContentKind,
        knowledge_base_id: i64,
    ) -> Result<IngestReport, CoreError> {
        let splitter = Splitter::new(self.config.chunk_window, self.config.chunk_overlap)?;
        IngestionPipeline::new(self.index_for(knowledge_base_id), splitter)
            .ingest(path.as_ref(), kind)
            .await
    }

    /// Removes every chunk of one ingested document. Returns how many chunks
    /// were removed; removing an unknown group is a no-op.
    pub async fn delete_chunk_group(
        &self,
        knowledge_base_id: i64,
        chunk_group_id: &str,
    ) -> Result<usize, CoreError> {
        self.index_for(knowledge_base_id)
            .delete_where(chunk_group_id)
            .await
    }

    /// Distinct ingested files in a knowledge base.
    pub async fn list_files(&self, knowledge_base_id: i64) -> Result<Vec<FileEntry>, CoreError> {
        self.index_for(knowledge_base_id).list_distinct_files().await
    }

    /// Runs one blocking turn and returns the assistant's answer. The caller
    /// persists the resulting turn itself.
    pub async fn respond(
        &self,
        history: &[Message],
        model_id: i64,
        knowledge_base_id: Option<i64>,
    ) -> Result<String, CoreError> {
        self.orchestrator(model_id, knowledge_base_id)?
            .respond(history)
            .await
    }

    /// Runs one streaming turn. The returned stream yields answer fragments;
    /// when it ends, the accumulated answer has been persisted through the
    /// [`TurnSink`] (at most once, and never for empty or error-only turns).
    pub fn respond_streaming(
        &self,
        conversation_id: i64,
        history: Vec<Message>,
        model_id: i64,
        knowledge_base_id: Option<i64>,
    ) -> Result<DeliveryStream, CoreError> {
        let orchestrator = self.orchestrator(model_id, knowledge_base_id)?;
        let tokens = orchestrator.respond_streaming(history);
        Ok(self.delivery.deliver(conversation_id, tokens))
    }
}

/// Derives a conversation title from its first user message: at most eight
/// characters, with `...` appended when truncated. Counts characters, not
/// bytes, so CJK input truncates cleanly.
#[must_use]
pub fn conversation_title(first_user_text: &str) -> String {
    let mut chars = first_user_text.chars();
    let head: String = chars.by_ref().take(8).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_titles_pass_through() {
        assert_eq!(conversation_title("你好"), "你好");
        assert_eq!(conversation_title("12345678"), "12345678");
    }

    #[test]
    fn long_titles_truncate_at_eight_chars() {
        assert_eq!(conversation_title("公司有餐补吗？请告诉我"), "公司有餐补吗？请...");
        assert_eq!(conversation_title("abcdefghij"), "abcdefgh...");
    }
}
