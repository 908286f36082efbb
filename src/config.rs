//! Engine configuration with environment fallbacks.

/// System instruction applied to every turn: respond in Simplified Chinese
/// regardless of input language, avoiding other languages except for code and
/// URLs.
pub const DEFAULT_PERSONA: &str = "你是一个专注用中文交流的政务助手，请遵守以下规则：\
1. 无论用户输入何种语言，始终使用简体中文回应。\
2. 不使用任何英文词汇，代码注释、网页链接例外。";

/// Default character window for document chunking.
pub const DEFAULT_CHUNK_WINDOW: usize = 1000;
/// Default overlap between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Default number of chunks returned by the retrieval tool.
pub const DEFAULT_TOP_K: usize = 2;

/// Configuration for [`crate::engine::ChatEngine`].
///
/// `Default` resolves service endpoints from the environment (after loading a
/// `.env` file when present), so deployments configure the engine without
/// code changes:
///
/// - `CHAT_API_URL` — OpenAI-compatible chat completions base URL
/// - `CHAT_API_KEY` — bearer token for the chat endpoint (optional)
/// - `EMBEDDING_API_URL` — Ollama-style embedding base URL
/// - `EMBEDDING_MODEL` — embedding model name (default `bge-m3`)
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Base URL of the OpenAI-compatible chat completions service.
    pub chat_base_url: String,
    /// Bearer token for the chat service, if required.
    pub chat_api_key: Option<String>,
    /// Base URL of the embedding service.
    pub embedding_base_url: String,
    /// Name of the embedding model.
    pub embedding_model: String,
    /// System instruction prepended to every generation prompt.
    pub persona: String,
    /// Character window used when splitting documents.
    pub chunk_window: usize,
    /// Overlap in characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks the retrieval tool returns.
    pub retrieval_top_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        dotenvy::dotenv().ok();
        Self {
            chat_base_url: std::env::var("CHAT_API_URL")
                .unwrap_or_else(|_| "http://localhost:11434/v1".to_string()),
            chat_api_key: std::env::var("CHAT_API_KEY").ok(),
            embedding_base_url: std::env::var("EMBEDDING_API_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            embedding_model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "bge-m3".to_string()),
            persona: DEFAULT_PERSONA.to_string(),
            chunk_window: DEFAULT_CHUNK_WINDOW,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            retrieval_top_k: DEFAULT_TOP_K,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    #[must_use]
    pub fn with_chat_endpoint(mut self, base_url: impl Into<String>) -> Self {
        self.chat_base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_chunking(mut self, window: usize, overlap: usize) -> Self {
        self.chunk_window = window;
        self.chunk_overlap = overlap;
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.retrieval_top_k = top_k;
        self
    }
}
