//! Thin client interfaces over the external model services.
//!
//! The core never talks to a provider directly; it consumes the [`ChatClient`]
//! and [`EmbeddingClient`] traits. Production implementations live in
//! [`openai`] and [`ollama`]; [`mock`] provides a deterministic embedder for
//! tests and offline use.

pub mod mock;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

pub use mock::MockEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiChatClient;

use crate::message::{Message, ToolCall};
use crate::types::CoreError;

/// Lazily produced token fragments from a chat model.
pub type ClientTokenStream = BoxStream<'static, Result<String, ChatClientError>>;

/// A tool the model may request during a blocking invocation.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool's arguments.
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Result of a blocking chat invocation: either text, or a tool request
/// (with empty or partial text).
#[derive(Clone, Debug, Default)]
pub struct ChatOutcome {
    pub text: String,
    pub tool_call: Option<ToolCall>,
}

/// Failures raised by chat model clients.
#[derive(Clone, Debug, Error)]
pub enum ChatClientError {
    /// The service classified our request as malformed (HTTP 400/422).
    /// Surfaced to end users as a generic message.
    #[error("model rejected the request: {0}")]
    BadRequest(String),

    /// Network or service-level failure.
    #[error("chat transport error: {0}")]
    Transport(String),

    /// The service answered with a shape we cannot interpret.
    #[error("unexpected chat response: {0}")]
    Protocol(String),
}

impl ChatClientError {
    /// True for failures that must be replaced with a caller-safe message.
    #[must_use]
    pub fn is_malformed_request(&self) -> bool {
        matches!(self, Self::BadRequest(_))
    }
}

impl From<reqwest::Error> for ChatClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Chat completion access, in blocking and streaming form.
///
/// The blocking form must support binding declared tools for potential
/// invocation; the streaming form produces raw token fragments and is only
/// used for the final generation step of a turn.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Produce a completion for `messages`, offering `tools` for invocation.
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ChatOutcome, ChatClientError>;

    /// Produce a completion as a lazy sequence of token fragments.
    async fn stream(&self, messages: &[Message]) -> Result<ClientTokenStream, ChatClientError>;
}

impl std::fmt::Debug for dyn ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ChatClient")
    }
}

/// Text-to-vector access used by the vector index adapter.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a batch of texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError>;
}
