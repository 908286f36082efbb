//! ```text
//! Uploaded file ──► ingest::loader ──► ingest::splitter ──► ChunkRecords
//!                                                             │
//!                              clients::EmbeddingClient ◄─────┤
//!                                                             ▼
//!                                  index::VectorIndex (one collection per knowledge base)
//!                                                             │
//! Conversation turn ──► orchestrator::Orchestrator ──► retrieval::RetrieveTool
//!                              │
//!                              ├─► respond            (blocking answer)
//!                              └─► respond_streaming ──► streaming::DeliveryPipeline
//!                                                             │
//!                                          engine::TurnSink (assistant turn, exactly once)
//! ```
//!
//! The crate is the conversation core only: it decides whether a turn needs
//! retrieval, grounds the answer in per-knowledge-base document chunks, and
//! delivers streamed tokens while persisting the final answer exactly once.
//! HTTP routing, authentication, and row CRUD live in the caller and reach the
//! core through [`engine::ChatEngine`] and the traits in [`clients`],
//! [`index`], and [`engine`].

pub mod clients;
pub mod config;
pub mod engine;
pub mod index;
pub mod ingest;
pub mod message;
pub mod orchestrator;
pub mod registry;
pub mod retrieval;
pub mod streaming;
pub mod telemetry;
pub mod types;

pub use config::EngineConfig;
pub use engine::{ChatEngine, TurnSink};
pub use message::{Message, ToolCall};
pub use types::CoreError;
