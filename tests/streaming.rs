//! Delivery-pipeline guarantees: exactly-once persistence, sentinel error
//! fragments, and disconnect handling.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;

use convosmith::clients::ChatClientError;
use convosmith::orchestrator::TokenStream;
use convosmith::streaming::{DeliveryPipeline, ERROR_SENTINEL};
use convosmith::types::{CoreError, GENERIC_FAILURE_MESSAGE};

use common::RecordingSink;

fn tokens(items: Vec<Result<String, CoreError>>) -> TokenStream {
    stream::iter(items).boxed()
}

fn ok(text: &str) -> Result<String, CoreError> {
    Ok(text.to_string())
}

/// Finalization runs on a detached task, so give it a bounded moment.
async fn wait_for_turns(sink: &RecordingSink, expected: usize) {
    for _ in 0..100 {
        if sink.turns().len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn drained_turn_is_persisted_exactly_once() {
    convosmith::telemetry::init_tracing();
    let sink = RecordingSink::new();
    let pipeline = DeliveryPipeline::new(sink.clone());

    let delivered: Vec<String> = pipeline
        .deliver(11, tokens(vec![ok("每月"), ok("有500元"), ok("餐补。")]))
        .collect()
        .await;
    assert_eq!(delivered, vec!["每月", "有500元", "餐补。"]);

    wait_for_turns(&sink, 1).await;
    assert_eq!(sink.turns(), vec![(11, "每月有500元餐补。".to_string())]);
}

#[tokio::test]
async fn empty_turn_is_not_persisted() {
    let sink = RecordingSink::new();
    let pipeline = DeliveryPipeline::new(sink.clone());

    let delivered: Vec<String> = pipeline.deliver(12, tokens(vec![])).collect().await;
    assert!(delivered.is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.turns().is_empty());
}

#[tokio::test]
async fn classified_failure_becomes_a_sentinel_fragment() {
    let sink = RecordingSink::new();
    let pipeline = DeliveryPipeline::new(sink.clone());

    let failure = CoreError::generation(ChatClientError::BadRequest("bad prompt".to_string()));
    let delivered: Vec<String> = pipeline
        .deliver(13, tokens(vec![ok("部分回答"), Err(failure)]))
        .collect()
        .await;
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0], "部分回答");
    assert_eq!(
        delivered[1],
        format!("{ERROR_SENTINEL}{GENERIC_FAILURE_MESSAGE}")
    );

    // The partial answer produced before the failure is still persisted.
    wait_for_turns(&sink, 1).await;
    assert_eq!(sink.turns(), vec![(13, "部分回答".to_string())]);
}

#[tokio::test]
async fn unclassified_failure_closes_the_stream_silently() {
    let sink = RecordingSink::new();
    let pipeline = DeliveryPipeline::new(sink.clone());

    let failure = CoreError::generation(ChatClientError::Transport("reset".to_string()));
    let delivered: Vec<String> = pipeline
        .deliver(14, tokens(vec![ok("部分"), Err(failure)]))
        .collect()
        .await;
    assert_eq!(delivered, vec!["部分"]);

    wait_for_turns(&sink, 1).await;
    assert_eq!(sink.turns(), vec![(14, "部分".to_string())]);
}

#[tokio::test]
async fn failure_before_any_fragment_persists_nothing() {
    let sink = RecordingSink::new();
    let pipeline = DeliveryPipeline::new(sink.clone());

    let failure = CoreError::generation(ChatClientError::BadRequest("bad prompt".to_string()));
    let delivered: Vec<String> = pipeline.deliver(15, tokens(vec![Err(failure)])).collect().await;
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].starts_with(ERROR_SENTINEL));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.turns().is_empty(), "sentinel-only turns are never persisted");
}

#[tokio::test]
async fn consumer_disconnect_stops_upstream_and_persists_the_partial() {
    let sink = RecordingSink::new();
    let pipeline = DeliveryPipeline::new(sink.clone());

    let produced = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&produced);
    let upstream: TokenStream = async_stream::stream! {
        for _ in 0..1000 {
            counter.fetch_add(1, Ordering::SeqCst);
            yield Ok("字".to_string());
        }
    }
    .boxed();

    let mut delivered = pipeline.deliver(16, upstream);
    for _ in 0..3 {
        assert!(delivered.next().await.is_some());
    }
    drop(delivered);

    wait_for_turns(&sink, 1).await;
    let turns = sink.turns();
    assert_eq!(turns.len(), 1);
    let (conversation_id, content) = &turns[0];
    assert_eq!(*conversation_id, 16);
    assert!(content.chars().all(|ch| ch == '字'));
    // The driver stops at the first failed send, well short of the full
    // upstream (3 read + channel capacity + in-flight).
    assert!(content.chars().count() >= 3);
    assert!(content.chars().count() < 1000);
    assert!(produced.load(Ordering::SeqCst) < 1000, "upstream was released early");
}

#[tokio::test]
async fn persistence_failure_never_reaches_the_consumer() {
    let sink = RecordingSink::failing();
    let pipeline = DeliveryPipeline::new(sink.clone());

    let delivered: Vec<String> = pipeline
        .deliver(17, tokens(vec![ok("你好")]))
        .collect()
        .await;
    assert_eq!(delivered, vec!["你好"]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.turns().is_empty());
}
