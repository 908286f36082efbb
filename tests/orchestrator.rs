//! Turn-level behavior of the orchestrator: mode selection, retrieval
//! grounding, and failure mapping.

mod common;

use std::io::Write;
use std::sync::Arc;

use futures_util::StreamExt;

use convosmith::clients::{ChatClientError, MockEmbeddingClient};
use convosmith::config::DEFAULT_PERSONA;
use convosmith::index::{MemoryBackend, VectorIndex};
use convosmith::ingest::{ContentKind, IngestionPipeline, Splitter};
use convosmith::message::Message;
use convosmith::orchestrator::Orchestrator;
use convosmith::retrieval::RetrieveTool;
use convosmith::types::{CoreError, GENERIC_FAILURE_MESSAGE};

use common::{ScriptStep, ScriptedChatClient};

/// A retrieval tool over a fresh in-memory knowledge base holding one
/// document with the given content.
async fn tool_with_document(content: &str) -> RetrieveTool {
    let index = VectorIndex::for_knowledge_base(
        Arc::new(MemoryBackend::new()),
        Arc::new(MockEmbeddingClient::new()),
        1,
    );
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{content}").unwrap();
    IngestionPipeline::new(index.clone(), Splitter::new(1000, 200).unwrap())
        .ingest(file.path(), ContentKind::Text)
        .await
        .unwrap();
    RetrieveTool::new(index, 2)
}

#[tokio::test]
async fn ungrounded_turn_skips_retrieval_entirely() {
    let client = ScriptedChatClient::new(vec![ScriptStep::answer("公司餐补请咨询人事部门。")]);
    let orchestrator = Orchestrator::new(client.clone(), DEFAULT_PERSONA);

    let answer = orchestrator
        .respond(&[Message::user("公司有餐补吗？")])
        .await
        .unwrap();
    assert_eq!(answer, "公司餐补请咨询人事部门。");

    // Exactly one model call: the decision step never runs without a tool.
    let prompts = client.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0][0].has_role(Message::SYSTEM));
    assert_eq!(prompts[0][0].content, DEFAULT_PERSONA);
    assert_eq!(prompts[0][1].content, "公司有餐补吗？");
}

#[tokio::test]
async fn grounded_turn_feeds_retrieved_content_to_generation() {
    let tool = tool_with_document("员工福利手册\n餐补: 每月500元\n年假: 15天").await;
    let client = ScriptedChatClient::new(vec![
        ScriptStep::retrieve("餐补"),
        ScriptStep::answer("每月有500元餐补。"),
    ]);
    let orchestrator = Orchestrator::new(client.clone(), DEFAULT_PERSONA).with_tool(tool);

    let answer = orchestrator
        .respond(&[Message::user("公司有餐补吗？")])
        .await
        .unwrap();
    assert_eq!(answer, "每月有500元餐补。");

    let prompts = client.prompts();
    assert_eq!(prompts.len(), 2, "decision call then generation call");

    // Decision call sees the raw history, no persona injected yet.
    assert_eq!(prompts[0].len(), 1);
    assert!(prompts[0][0].has_role(Message::USER));

    // Generation call gets persona + retrieved content as the system message
    // and a filtered history with no tool traffic.
    let generation = &prompts[1];
    assert!(generation[0].has_role(Message::SYSTEM));
    assert!(generation[0].content.starts_with(DEFAULT_PERSONA));
    assert!(generation[0].content.contains("餐补: 每月500元"));
    assert_eq!(generation.len(), 2);
    assert!(generation[1].has_role(Message::USER));
}

#[tokio::test]
async fn direct_answer_from_decision_ends_the_turn() {
    let tool = tool_with_document("餐补: 每月500元").await;
    let client = ScriptedChatClient::new(vec![ScriptStep::answer("你好！有什么可以帮你？")]);
    let orchestrator = Orchestrator::new(client.clone(), DEFAULT_PERSONA).with_tool(tool);

    let answer = orchestrator.respond(&[Message::user("你好")]).await.unwrap();
    assert_eq!(answer, "你好！有什么可以帮你？");
    assert_eq!(client.prompts().len(), 1, "no generation call after a direct answer");
}

#[tokio::test]
async fn unknown_tool_name_is_a_protocol_violation() {
    let tool = tool_with_document("餐补: 每月500元").await;
    let client = ScriptedChatClient::new(vec![ScriptStep::RequestTool {
        name: "delete_documents".to_string(),
        query: "餐补".to_string(),
    }]);
    let orchestrator = Orchestrator::new(client, DEFAULT_PERSONA).with_tool(tool);

    let err = orchestrator
        .respond(&[Message::user("公司有餐补吗？")])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ToolProtocol(_)));
}

#[tokio::test]
async fn classified_decision_failure_surfaces_generic_message() {
    let tool = tool_with_document("餐补: 每月500元").await;
    let client = ScriptedChatClient::new(vec![ScriptStep::Fail(ChatClientError::BadRequest(
        "context length exceeded".to_string(),
    ))]);
    let orchestrator = Orchestrator::new(client, DEFAULT_PERSONA).with_tool(tool);

    let err = orchestrator
        .respond(&[Message::user("公司有餐补吗？")])
        .await
        .unwrap_err();
    assert!(err.is_malformed_request());
    assert_eq!(err.caller_message(), GENERIC_FAILURE_MESSAGE);
    assert!(
        !err.caller_message().contains("context length"),
        "provider detail must not leak"
    );
}

#[tokio::test]
async fn transport_failure_keeps_its_detail() {
    let client = ScriptedChatClient::new(vec![ScriptStep::Fail(ChatClientError::Transport(
        "connection reset".to_string(),
    ))]);
    let orchestrator = Orchestrator::new(client, DEFAULT_PERSONA);

    let err = orchestrator
        .respond(&[Message::user("你好")])
        .await
        .unwrap_err();
    assert!(!err.is_malformed_request());
    assert!(err.caller_message().contains("connection reset"));
}

#[tokio::test]
async fn streaming_generation_yields_fragments_in_order() {
    let tool = tool_with_document("餐补: 每月500元").await;
    let client = ScriptedChatClient::new(vec![
        ScriptStep::retrieve("餐补"),
        ScriptStep::fragments(&["每月", "有500元", "餐补。"]),
    ]);
    let orchestrator = Orchestrator::new(client, DEFAULT_PERSONA).with_tool(tool);

    let fragments: Vec<_> = orchestrator
        .respond_streaming(vec![Message::user("公司有餐补吗？")])
        .collect()
        .await;
    let texts: Vec<String> = fragments.into_iter().map(Result::unwrap).collect();
    assert_eq!(texts, vec!["每月", "有500元", "餐补。"]);
}

#[tokio::test]
async fn streaming_direct_answer_is_a_single_fragment() {
    let tool = tool_with_document("餐补: 每月500元").await;
    let client = ScriptedChatClient::new(vec![ScriptStep::answer("你好！")]);
    let orchestrator = Orchestrator::new(client, DEFAULT_PERSONA).with_tool(tool);

    let fragments: Vec<_> = orchestrator
        .respond_streaming(vec![Message::user("你好")])
        .collect()
        .await;
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].as_ref().unwrap(), "你好！");
}

#[tokio::test]
async fn streaming_surfaces_failure_as_terminal_err() {
    let client = ScriptedChatClient::new(vec![ScriptStep::StreamFail(
        ChatClientError::Transport("connection refused".to_string()),
    )]);
    let orchestrator = Orchestrator::new(client, DEFAULT_PERSONA);

    let fragments: Vec<_> = orchestrator
        .respond_streaming(vec![Message::user("你好")])
        .collect()
        .await;
    assert_eq!(fragments.len(), 1);
    assert!(fragments[0].is_err());
}
