//! Error taxonomy for the conversation core.

use std::path::PathBuf;

use thiserror::Error;

use crate::clients::ChatClientError;
use crate::ingest::ContentKind;

/// Caller-safe replacement for classified "malformed request" failures.
///
/// Surfaced instead of the provider's own message, which may leak request
/// internals the end user should not see.
pub const GENERIC_FAILURE_MESSAGE: &str = "抱歉，我暂时无法处理这个请求，请稍后再试。";

/// Errors surfaced by the conversation core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested model identifier could not be resolved to a chat client.
    #[error("model '{0}' is not available")]
    ModelUnavailable(String),

    /// The ingestion source file does not exist or cannot be read.
    #[error("source file '{}' is not readable: {reason}", path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    /// The ingestion pipeline has no loader for this content kind.
    #[error("unsupported content kind: {0:?}")]
    UnsupportedContentKind(ContentKind),

    /// The chat model requested a tool the orchestrator never offered.
    /// Indicates a chat-client contract violation; fatal.
    #[error("tool protocol violation: {0}")]
    ToolProtocol(String),

    /// A model or tool invocation failed while producing a turn.
    #[error("generation failed: {message}")]
    Generation {
        message: String,
        /// True when the failure was classified as a malformed request,
        /// in which case callers see [`GENERIC_FAILURE_MESSAGE`] instead.
        malformed_request: bool,
    },

    /// Chunk upsert (or another ingestion step) failed; the caller must not
    /// create a Document row for this source.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// The embedding service rejected or failed a request.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The vector storage backend failed.
    #[error("vector storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Wraps a chat-client failure, preserving its classification.
    #[must_use]
    pub fn generation(err: ChatClientError) -> Self {
        Self::Generation {
            malformed_request: err.is_malformed_request(),
            message: err.to_string(),
        }
    }

    /// Wraps a retrieval-tool failure encountered mid-turn.
    #[must_use]
    pub fn generation_from_tool(err: CoreError) -> Self {
        Self::Generation {
            malformed_request: false,
            message: err.to_string(),
        }
    }

    /// True when this failure was classified as a malformed request.
    #[must_use]
    pub fn is_malformed_request(&self) -> bool {
        matches!(
            self,
            CoreError::Generation {
                malformed_request: true,
                ..
            }
        )
    }

    /// The message a caller may show to an end user: classified malformed
    /// requests are replaced by a generic message, everything else keeps its
    /// original detail.
    #[must_use]
    pub fn caller_message(&self) -> String {
        if self.is_malformed_request() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}
