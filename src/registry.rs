//! Read-only model table and resolution to chat clients.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::clients::{ChatClient, OpenAiChatClient};
use crate::types::CoreError;

/// One row of the model table. Read-only from the orchestrator's perspective.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: i64,
    /// Addressable identifier of the backing model, e.g. `deepseek-chat`.
    pub name: String,
    pub description: String,
    pub active: bool,
}

impl ModelEntry {
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            active: true,
        }
    }
}

/// Builds a chat client for a resolved model entry.
///
/// Production uses [`OpenAiClientFactory`]; tests substitute scripted clients.
pub trait ChatClientFactory: Send + Sync {
    fn build(&self, entry: &ModelEntry) -> Arc<dyn ChatClient>;
}

/// Factory producing [`OpenAiChatClient`]s against one configured endpoint.
pub struct OpenAiClientFactory {
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiClientFactory {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
        }
    }
}

impl ChatClientFactory for OpenAiClientFactory {
    fn build(&self, entry: &ModelEntry) -> Arc<dyn ChatClient> {
        let mut client = OpenAiChatClient::new(&self.base_url, &entry.name);
        if let Some(key) = &self.api_key {
            client = client.with_api_key(key);
        }
        Arc::new(client)
    }
}

/// Maps model ids to chat clients. Unknown or inactive ids fail with
/// [`CoreError::ModelUnavailable`].
pub struct ModelRegistry {
    entries: FxHashMap<i64, ModelEntry>,
    factory: Arc<dyn ChatClientFactory>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new(factory: Arc<dyn ChatClientFactory>) -> Self {
        Self {
            entries: FxHashMap::default(),
            factory,
        }
    }

    pub fn register(&mut self, entry: ModelEntry) {
        self.entries.insert(entry.id, entry);
    }

    #[must_use]
    pub fn with_model(mut self, entry: ModelEntry) -> Self {
        self.register(entry);
        self
    }

    #[must_use]
    pub fn entry(&self, model_id: i64) -> Option<&ModelEntry> {
        self.entries.get(&model_id)
    }

    /// Resolves a model id to a chat client.
    pub fn resolve(&self, model_id: i64) -> Result<Arc<dyn ChatClient>, CoreError> {
        let entry = self
            .entries
            .get(&model_id)
            .filter(|entry| entry.active)
            .ok_or_else(|| CoreError::ModelUnavailable(model_id.to_string()))?;
        Ok(self.factory.build(entry))
    }
}
