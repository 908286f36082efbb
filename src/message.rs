use serde::{Deserialize, Serialize};

/// A tool invocation requested by the model.
///
/// The orchestrator only ever honors the retrieval tool; any other name is a
/// contract violation of the chat model client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool the model wants invoked.
    pub name: String,
    /// Structured arguments, e.g. `{"query": "..."}` for retrieval.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Extracts the `query` argument, if present.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.arguments.get("query").and_then(|value| value.as_str())
    }
}

/// A message in a conversation, containing a role and text content.
///
/// Messages are the primary data structure for conversation turns and prompt
/// assembly. Each message has a role (`"user"`, `"assistant"`, `"system"`, or
/// `"tool"`) and text content; assistant messages that requested a tool
/// invocation additionally carry the [`ToolCall`].
///
/// # Examples
///
/// ```
/// use convosmith::message::Message;
///
/// let user_msg = Message::user("公司有餐补吗？");
/// let assistant_msg = Message::assistant("每月有500元餐补。");
/// let system_msg = Message::system("你是一个政务助手。");
///
/// assert!(user_msg.has_role(Message::USER));
/// ```
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender.
    ///
    /// Use the constants on [`Message`] for standardized values.
    pub role: String,
    /// The text content of the message.
    pub content: String,
    /// A tool invocation this (assistant) message requested, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
}

impl Message {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// AI assistant response message role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System prompt or instruction message role.
    pub const SYSTEM: &'static str = "system";
    /// Tool result message role.
    pub const TOOL: &'static str = "tool";

    /// Creates a new message with the specified role and content.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            tool_call: None,
        }
    }

    /// Creates a user message with the specified content.
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates an assistant message with the specified content.
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Creates a system message with the specified content.
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Creates a tool-result message with the specified content.
    #[must_use]
    pub fn tool(content: &str) -> Self {
        Self::new(Self::TOOL, content)
    }

    /// Creates an assistant message that carries a tool invocation request.
    #[must_use]
    pub fn assistant_tool_call(call: ToolCall) -> Self {
        Self {
            role: Self::ASSISTANT.to_string(),
            content: String::new(),
            tool_call: Some(call),
        }
    }

    /// Returns true if this message has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Returns true if this message requested a tool invocation.
    #[must_use]
    pub fn is_tool_call(&self) -> bool {
        self.tool_call.is_some()
    }

    /// Filters a conversation history down to the messages that belong in a
    /// generation prompt: user and system turns, plus assistant turns that did
    /// not issue a tool call. Tool results and tool-call markers are dropped
    /// so a fresh generation cannot re-trigger retrieval.
    #[must_use]
    pub fn prompt_history(history: &[Message]) -> Vec<Message> {
        history
            .iter()
            .filter(|message| match message.role.as_str() {
                Self::USER | Self::SYSTEM => true,
                Self::ASSISTANT => !message.is_tool_call(),
                _ => false,
            })
            .cloned()
            .collect()
    }
}
