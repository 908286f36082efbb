//! The per-turn state machine that decides whether to ground an answer in
//! retrieved knowledge before generating it.
//!
//! A turn walks `DecideOrRetrieve → (ToolExecution →) Generate → Done`. The
//! retrieval tool is offered to the model only in the first state and invoked
//! at most once per turn; afterwards the final answer is produced from the
//! persona plus whatever was retrieved.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tracing::{debug, instrument, warn};

use crate::clients::ChatClient;
use crate::message::{Message, ToolCall};
use crate::retrieval::{RETRIEVE_TOOL_NAME, RetrieveTool};
use crate::types::CoreError;

/// Lazily produced answer fragments for one turn.
pub type TokenStream = BoxStream<'static, Result<String, CoreError>>;

/// Phases of one conversation turn.
#[derive(Debug, Clone)]
pub enum TurnState {
    /// Ask the model to either answer directly or request retrieval.
    DecideOrRetrieve,
    /// Run the retrieval tool the model asked for.
    ToolExecution(ToolCall),
    /// Produce the final answer, grounded in `context` when non-empty.
    Generate { context: String },
    /// Terminal: the finished answer text.
    Done(String),
}

/// Drives one conversation turn against a resolved chat client.
#[derive(Clone)]
pub struct Orchestrator {
    chat: Arc<dyn ChatClient>,
    persona: String,
    tool: Option<RetrieveTool>,
}

impl Orchestrator {
    pub fn new(chat: Arc<dyn ChatClient>, persona: impl Into<String>) -> Self {
        Self {
            chat,
            persona: persona.into(),
            tool: None,
        }
    }

    /// Attaches a retrieval tool, enabling grounded turns.
    #[must_use]
    pub fn with_tool(mut self, tool: RetrieveTool) -> Self {
        self.tool = Some(tool);
        self
    }

    /// Runs a complete turn and returns the finished answer.
    #[instrument(skip_all, fields(grounded = self.tool.is_some()))]
    pub async fn respond(&self, history: &[Message]) -> Result<String, CoreError> {
        let mut history = history.to_vec();
        let mut state = TurnState::DecideOrRetrieve;
        loop {
            state = self.advance(state, &mut history).await?;
            if let TurnState::Done(answer) = state {
                return Ok(answer);
            }
        }
    }

    /// Runs a turn, streaming the final answer as token fragments.
    ///
    /// Only the `Generate` phase streams; a direct answer out of
    /// `DecideOrRetrieve` is emitted as a single fragment. Failures surface
    /// as one `Err` item terminating the stream.
    pub fn respond_streaming(&self, history: Vec<Message>) -> TokenStream {
        let this = self.clone();
        stream::once(async move { this.streaming_turn(history).await })
            .flatten()
            .boxed()
    }

    async fn streaming_turn(&self, mut history: Vec<Message>) -> TokenStream {
        let mut state = TurnState::DecideOrRetrieve;
        loop {
            match state {
                TurnState::Generate { context } => {
                    let prompt = self.generate_prompt(&history, &context);
                    return match self.chat.stream(&prompt).await {
                        Ok(tokens) => tokens
                            .map(|fragment| fragment.map_err(CoreError::generation))
                            .boxed(),
                        Err(err) => stream::iter([Err(CoreError::generation(err))]).boxed(),
                    };
                }
                TurnState::Done(answer) => return stream::iter([Ok(answer)]).boxed(),
                other => match self.advance(other, &mut history).await {
                    Ok(next) => state = next,
                    Err(err) => return stream::iter([Err(err)]).boxed(),
                },
            }
        }
    }

    /// The exhaustive transition function. `history` is the turn's working
    /// copy; tool traffic is appended to it as the turn progresses.
    async fn advance(
        &self,
        state: TurnState,
        history: &mut Vec<Message>,
    ) -> Result<TurnState, CoreError> {
        match state {
            TurnState::DecideOrRetrieve => {
                let Some(tool) = &self.tool else {
                    // No knowledge base bound, nothing to decide.
                    return Ok(TurnState::Generate {
                        context: String::new(),
                    });
                };
                let outcome = self
                    .chat
                    .invoke(history, &[tool.spec()])
                    .await
                    .map_err(CoreError::generation)?;
                match outcome.tool_call {
                    Some(call) => {
                        debug!(tool = %call.name, "model requested retrieval");
                        history.push(Message::assistant_tool_call(call.clone()));
                        Ok(TurnState::ToolExecution(call))
                    }
                    None => Ok(TurnState::Done(outcome.text)),
                }
            }
            TurnState::ToolExecution(call) => {
                if call.name != RETRIEVE_TOOL_NAME {
                    return Err(CoreError::ToolProtocol(format!(
                        "model requested unknown tool '{}'",
                        call.name
                    )));
                }
                let tool = self.tool.as_ref().ok_or_else(|| {
                    CoreError::ToolProtocol("tool requested but none is bound".into())
                })?;
                let query = call.query().ok_or_else(|| {
                    CoreError::ToolProtocol("retrieval call is missing the 'query' argument".into())
                })?;
                let retrieved = tool
                    .execute(query)
                    .await
                    .map_err(CoreError::generation_from_tool)?;
                if retrieved.is_empty() {
                    warn!(query = %query, "retrieval returned no matches");
                }
                history.push(Message::tool(&retrieved.serialized));
                Ok(TurnState::Generate {
                    context: retrieved.serialized,
                })
            }
            TurnState::Generate { context } => {
                let prompt = self.generate_prompt(history, &context);
                let outcome = self
                    .chat
                    .invoke(&prompt, &[])
                    .await
                    .map_err(CoreError::generation)?;
                Ok(TurnState::Done(outcome.text))
            }
            TurnState::Done(answer) => Ok(TurnState::Done(answer)),
        }
    }

    /// System instruction (persona plus retrieved context) followed by the
    /// filtered conversation history.
    fn generate_prompt(&self, history: &[Message], context: &str) -> Vec<Message> {
        let system = if context.is_empty() {
            self.persona.clone()
        } else {
            format!("{}\n\n{context}", self.persona)
        };
        let mut prompt = Vec::with_capacity(history.len() + 1);
        prompt.push(Message::system(&system));
        prompt.extend(Message::prompt_history(history));
        prompt
    }
}
