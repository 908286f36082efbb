//! Streaming delivery: forwards a turn's token fragments to the consumer and
//! guarantees the finished answer is persisted exactly once.
//!
//! Fragments flow through a bounded channel so the consumer's read pace is
//! the pipeline's production pace. A driver task accumulates every fragment
//! it forwards; when the upstream ends (or fails, or the consumer walks
//! away) it runs finalization over the accumulation.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tracing::{debug, warn};

use crate::orchestrator::TokenStream;
use crate::types::CoreError;

/// Prefix marking a fragment as an error notice rather than answer text.
/// An accumulation starting with it is never persisted.
pub const ERROR_SENTINEL: &str = "\u{26a0} ";

/// Channel capacity between the driver task and the consumer.
const CHANNEL_CAPACITY: usize = 16;

/// Persistence seam for finished assistant turns, implemented by the CRUD
/// layer that owns conversation rows.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn persist_assistant_turn(
        &self,
        conversation_id: i64,
        content: &str,
    ) -> Result<(), CoreError>;
}

/// The fragments handed to the outward consumer.
pub type DeliveryStream = BoxStream<'static, String>;

#[derive(Clone)]
pub struct DeliveryPipeline {
    sink: Arc<dyn TurnSink>,
}

impl DeliveryPipeline {
    pub fn new(sink: Arc<dyn TurnSink>) -> Self {
        Self { sink }
    }

    /// Bridges `tokens` to a consumer-facing stream.
    ///
    /// Fragments are forwarded in production order. A classified mid-stream
    /// failure becomes one terminal sentinel fragment with a caller-safe
    /// message; any other failure just closes the stream. Either way, once
    /// the stream ends the accumulated text is persisted as one assistant
    /// turn, unless it is empty or sentinel-prefixed. If the consumer drops
    /// the stream early, the upstream is released and the partial
    /// accumulation is still persisted.
    pub fn deliver(&self, conversation_id: i64, tokens: TokenStream) -> DeliveryStream {
        let (tx, rx) = flume::bounded::<String>(CHANNEL_CAPACITY);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            let mut upstream = tokens;
            let mut accumulated = String::new();

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(fragment) => {
                        accumulated.push_str(&fragment);
                        if tx.send_async(fragment).await.is_err() {
                            debug!(conversation_id, "consumer disconnected mid-stream");
                            break;
                        }
                    }
                    Err(err) if err.is_malformed_request() => {
                        let notice = format!("{ERROR_SENTINEL}{}", err.caller_message());
                        warn!(conversation_id, error = %err, "turn failed mid-stream");
                        let _ = tx.send_async(notice).await;
                        break;
                    }
                    Err(err) => {
                        warn!(conversation_id, error = %err, "turn failed mid-stream");
                        break;
                    }
                }
            }
            // Release the model stream before persisting.
            drop(upstream);
            drop(tx);

            if accumulated.is_empty() || accumulated.starts_with(ERROR_SENTINEL) {
                debug!(conversation_id, "nothing to persist for this turn");
                return;
            }
            if let Err(err) = sink
                .persist_assistant_turn(conversation_id, &accumulated)
                .await
            {
                // The response is already closing; never re-raise.
                warn!(conversation_id, error = %err, "failed to persist assistant turn");
            }
        });

        rx.into_stream().boxed()
    }
}
