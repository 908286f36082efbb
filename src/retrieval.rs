//! The retrieval tool offered to the chat model during a grounded turn.

use serde_json::json;
use tracing::debug;

use crate::clients::ToolSpec;
use crate::index::{SearchHit, VectorIndex};
use crate::types::CoreError;

/// Tool name the chat model requests by.
pub const RETRIEVE_TOOL_NAME: &str = "retrieve";

/// Result of one tool execution: the serialized text handed to the model and
/// the raw hits for callers that want scores or metadata.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub serialized: String,
    pub hits: Vec<SearchHit>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Similarity search over one knowledge base, exposed as a model-invocable
/// tool.
#[derive(Clone)]
pub struct RetrieveTool {
    index: VectorIndex,
    top_k: usize,
}

impl RetrieveTool {
    pub fn new(index: VectorIndex, top_k: usize) -> Self {
        Self { index, top_k }
    }

    /// Declaration advertised to the chat model.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: RETRIEVE_TOOL_NAME.to_string(),
            description: "Retrieve information related to a query.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query."
                    }
                },
                "required": ["query"]
            }),
        }
    }

    /// Embeds the query, searches the knowledge base, and serializes the
    /// matches into the `Source: {...}\nContent: {...}` blocks the model
    /// receives.
    pub async fn execute(&self, query: &str) -> Result<RetrievedContext, CoreError> {
        let hits = self.index.search(query, self.top_k).await?;
        debug!(
            query = %query,
            hits = hits.len(),
            collection = %self.index.collection(),
            "retrieval tool executed"
        );
        let serialized = serialize_hits(&hits);
        Ok(RetrievedContext { serialized, hits })
    }
}

fn serialize_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            let metadata = json!({
                "file_id": hit.chunk.group_id,
                "file_path": hit.chunk.file_path,
                "file_name": hit.chunk.file_name,
            });
            format!("Source: {metadata}\nContent: {}", hit.chunk.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
