#![allow(dead_code)]

//! Shared test doubles: a scripted chat client and a recording turn sink.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;

use convosmith::clients::{
    ChatClient, ChatClientError, ChatOutcome, ClientTokenStream, ToolSpec,
};
use convosmith::message::{Message, ToolCall};
use convosmith::streaming::TurnSink;
use convosmith::types::CoreError;

/// One scripted reaction of the chat client, consumed in order.
#[derive(Clone)]
pub enum ScriptStep {
    /// `invoke` returns this text with no tool call.
    Answer(String),
    /// `invoke` requests the named tool with a `{"query": ...}` argument.
    RequestTool { name: String, query: String },
    /// `invoke` fails.
    Fail(ChatClientError),
    /// `stream` yields these fragments in order.
    StreamFragments(Vec<Result<String, ChatClientError>>),
    /// `stream` fails before producing anything.
    StreamFail(ChatClientError),
}

impl ScriptStep {
    pub fn answer(text: &str) -> Self {
        Self::Answer(text.to_string())
    }

    pub fn retrieve(query: &str) -> Self {
        Self::RequestTool {
            name: "retrieve".to_string(),
            query: query.to_string(),
        }
    }

    pub fn fragments(parts: &[&str]) -> Self {
        Self::StreamFragments(parts.iter().map(|part| Ok(part.to_string())).collect())
    }
}

/// A chat client that replays a fixed script and records every prompt it was
/// given.
pub struct ScriptedChatClient {
    steps: Mutex<VecDeque<ScriptStep>>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedChatClient {
    pub fn new(steps: Vec<ScriptStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn next_step(&self) -> ScriptStep {
        self.steps
            .lock()
            .pop_front()
            .expect("scripted client ran out of steps")
    }

    /// Every prompt passed to `invoke` or `stream`, in call order.
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn invoke(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<ChatOutcome, ChatClientError> {
        self.prompts.lock().push(messages.to_vec());
        match self.next_step() {
            ScriptStep::Answer(text) => Ok(ChatOutcome {
                text,
                tool_call: None,
            }),
            ScriptStep::RequestTool { name, query } => Ok(ChatOutcome {
                text: String::new(),
                tool_call: Some(ToolCall::new(name, serde_json::json!({ "query": query }))),
            }),
            ScriptStep::Fail(err) => Err(err),
            other => panic!("invoke reached a streaming step: {}", step_name(&other)),
        }
    }

    async fn stream(&self, messages: &[Message]) -> Result<ClientTokenStream, ChatClientError> {
        self.prompts.lock().push(messages.to_vec());
        match self.next_step() {
            ScriptStep::StreamFragments(parts) => Ok(stream::iter(parts).boxed()),
            ScriptStep::StreamFail(err) => Err(err),
            ScriptStep::Answer(text) => Ok(stream::iter([Ok(text)]).boxed()),
            other => panic!("stream reached a blocking step: {}", step_name(&other)),
        }
    }
}

fn step_name(step: &ScriptStep) -> &'static str {
    match step {
        ScriptStep::Answer(_) => "Answer",
        ScriptStep::RequestTool { .. } => "RequestTool",
        ScriptStep::Fail(_) => "Fail",
        ScriptStep::StreamFragments(_) => "StreamFragments",
        ScriptStep::StreamFail(_) => "StreamFail",
    }
}

/// A turn sink that records persisted turns, optionally failing every write.
#[derive(Default)]
pub struct RecordingSink {
    turns: Mutex<Vec<(i64, String)>>,
    fail_writes: bool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(Vec::new()),
            fail_writes: true,
        })
    }

    pub fn turns(&self) -> Vec<(i64, String)> {
        self.turns.lock().clone()
    }
}

#[async_trait]
impl TurnSink for RecordingSink {
    async fn persist_assistant_turn(
        &self,
        conversation_id: i64,
        content: &str,
    ) -> Result<(), CoreError> {
        if self.fail_writes {
            return Err(CoreError::Storage("sink is read-only".to_string()));
        }
        self.turns
            .lock()
            .push((conversation_id, content.to_string()));
        Ok(())
    }
}
