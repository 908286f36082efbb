//! OpenAI-compatible chat completions client.
//!
//! Works against any `/v1/chat/completions` endpoint (OpenAI, DeepSeek,
//! Ollama's compatibility layer). Tool binding uses the standard `tools`
//! array; streaming uses server-sent events.

use std::collections::VecDeque;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Deserialize;
use serde_json::json;

use super::{ChatClient, ChatClientError, ChatOutcome, ClientTokenStream, ToolSpec};
use crate::message::{Message, ToolCall};

#[derive(Clone)]
pub struct OpenAiChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChatClient {
    /// Creates a client for `model` against `base_url` (e.g.
    /// `http://localhost:11434/v1`).
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: model.into(),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolSpec], stream: bool) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": wire_messages(messages),
            "stream": stream,
        });
        if !tools.is_empty() {
            let declared: Vec<serde_json::Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        },
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(declared);
        }
        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ChatClientError> {
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            Err(ChatClientError::BadRequest(detail))
        } else {
            Err(ChatClientError::Transport(format!("{status}: {detail}")))
        }
    }
}

#[async_trait::async_trait]
impl ChatClient for OpenAiChatClient {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ChatOutcome, ChatClientError> {
        let body = self.request_body(messages, tools, false);
        let response = self.post(&body).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| ChatClientError::Protocol(err.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatClientError::Protocol("response has no choices".into()))?;

        let tool_call = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|call| {
                let arguments = serde_json::from_str(&call.function.arguments)
                    .unwrap_or(serde_json::Value::String(call.function.arguments));
                ToolCall::new(call.function.name, arguments)
            });

        Ok(ChatOutcome {
            text: choice.message.content.unwrap_or_default(),
            tool_call,
        })
    }

    async fn stream(&self, messages: &[Message]) -> Result<ClientTokenStream, ChatClientError> {
        let body = self.request_body(messages, &[], true);
        let response = self.post(&body).await?;
        Ok(sse_token_stream(response.bytes_stream().boxed()))
    }
}

fn wire_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|message| json!({"role": message.role, "content": message.content}))
        .collect()
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

enum SseEvent {
    Token(String),
    Done,
    Skip,
    Malformed(String),
}

/// Interprets one SSE line from a chat completions stream.
fn parse_sse_line(line: &str) -> SseEvent {
    let line = line.trim();
    let Some(payload) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return SseEvent::Done;
    }
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => {
            let token = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .unwrap_or_default();
            if token.is_empty() {
                SseEvent::Skip
            } else {
                SseEvent::Token(token)
            }
        }
        Err(err) => SseEvent::Malformed(err.to_string()),
    }
}

struct SseState {
    inner: BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>,
    buffer: String,
    pending: VecDeque<Result<String, ChatClientError>>,
    finished: bool,
}

impl SseState {
    fn drain_lines(&mut self) {
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            match parse_sse_line(&line) {
                SseEvent::Token(token) => self.pending.push_back(Ok(token)),
                SseEvent::Done => self.finished = true,
                SseEvent::Skip => {}
                SseEvent::Malformed(detail) => {
                    self.pending
                        .push_back(Err(ChatClientError::Protocol(detail)));
                    self.finished = true;
                }
            }
            if self.finished {
                break;
            }
        }
    }
}

fn sse_token_stream(
    inner: BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>,
) -> ClientTokenStream {
    let state = SseState {
        inner,
        buffer: String::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.inner.next().await {
                None => state.finished = true,
                Some(Err(err)) => {
                    state.finished = true;
                    state
                        .pending
                        .push_back(Err(ChatClientError::Transport(err.to_string())));
                }
                Some(Ok(bytes)) => {
                    state.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    state.drain_lines();
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sse_token_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"你好"}}]}"#;
        match parse_sse_line(line) {
            SseEvent::Token(token) => assert_eq!(token, "你好"),
            _ => panic!("expected token"),
        }
    }

    #[test]
    fn parse_sse_done_and_noise() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseEvent::Done));
        assert!(matches!(parse_sse_line(": keep-alive"), SseEvent::Skip));
        assert!(matches!(parse_sse_line(""), SseEvent::Skip));
        assert!(matches!(
            parse_sse_line("data: {not json"),
            SseEvent::Malformed(_)
        ));
    }

    #[test]
    fn empty_delta_is_skipped() {
        let line = r#"data: {"choices":[{"delta":{}}]}"#;
        assert!(matches!(parse_sse_line(line), SseEvent::Skip));
    }

    #[test]
    fn request_body_declares_tools_only_when_present() {
        let client = OpenAiChatClient::new("http://localhost:11434/v1", "deepseek-chat");
        let messages = vec![Message::user("hi")];

        let bare = client.request_body(&messages, &[], false);
        assert!(bare.get("tools").is_none());

        let spec = ToolSpec::new("retrieve", "Retrieve information.", serde_json::json!({}));
        let with_tools = client.request_body(&messages, std::slice::from_ref(&spec), false);
        assert_eq!(with_tools["tools"][0]["function"]["name"], "retrieve");
    }
}
