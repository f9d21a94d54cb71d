//! One tool-calling exchange with the model: Prompting → ToolResolution → Finalizing.
//!
//! 1. Send the user prompt with every registered tool attached
//! 2. If the reply asks for tools, run them in order, append the assistant
//!    turn and one tool turn per call, and resend exactly once
//! 3. Take the text of the final reply, reject it if empty or if it reads
//!    like an error report
//!
//! Conversation state lives only for the duration of [`Orchestrator::run`].

use crate::agent::guard;
use crate::llm::{ChatModel, LlmError};
use crate::tools::ToolRegistry;
use crate::types::*;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Phase of a single orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationState {
    Prompting,
    ToolResolution,
    Finalizing,
}

impl fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prompting => write!(f, "prompting"),
            Self::ToolResolution => write!(f, "tool_resolution"),
            Self::Finalizing => write!(f, "finalizing"),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The model could not be reached or answered with garbage. Not retried here.
    #[error("model transport failed: {0}")]
    Transport(#[from] LlmError),

    #[error("model returned an empty answer")]
    EmptyResult,

    /// The answer text tripped the error-content heuristic.
    #[error("model answer looks like an error report (matched '{marker}'): {excerpt}")]
    FlaggedContent {
        marker: &'static str,
        excerpt: String,
    },
}

/// A tool call the model made and what it got back.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call: ToolCallRequest,
    pub result: ToolResult,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct Orchestration {
    pub answer: String,
    pub invocations: Vec<ToolInvocation>,
    /// Requests sent to the model: 1, or 2 when tools were resolved.
    pub round_trips: u8,
}

/// Drives one exchange against a model using a shared tool registry.
pub struct Orchestrator<'a> {
    model: &'a dyn ChatModel,
    registry: &'a ToolRegistry,
}

impl<'a> Orchestrator<'a> {
    pub fn new(model: &'a dyn ChatModel, registry: &'a ToolRegistry) -> Self {
        Self { model, registry }
    }

    /// Run the exchange for a single user prompt.
    pub async fn run(&self, prompt: &str) -> Result<Orchestration, OrchestrationError> {
        let tools = self.registry.list();
        let mut conversation = vec![ChatMessage::user(prompt)];
        let mut invocations = Vec::new();
        let mut round_trips = 1;

        let mut state = OrchestrationState::Prompting;
        debug!("Orchestration state: {}", state);
        let reply = self.model.complete(&conversation, &tools).await?;

        let final_reply = match reply {
            ModelReply::PlainAnswer { .. } => reply,
            ModelReply::ToolCallAnswer { content, calls } => {
                state = OrchestrationState::ToolResolution;
                debug!("Orchestration state: {} ({} calls)", state, calls.len());

                conversation.push(ChatMessage::assistant(
                    content.unwrap_or_default(),
                    calls.clone(),
                ));
                for call in calls {
                    info!("Model requested tool '{}'", call.name);
                    let result = self.registry.dispatch(&call).await;
                    conversation.push(ChatMessage::tool(&call, &result));
                    invocations.push(ToolInvocation { call, result });
                }

                round_trips += 1;
                self.model.complete(&conversation, &tools).await?
            }
        };

        state = OrchestrationState::Finalizing;
        debug!("Orchestration state: {}", state);

        // Whitespace only counts for the emptiness check; the text goes on as sent.
        let answer = final_reply
            .content()
            .filter(|text| !text.trim().is_empty())
            .ok_or(OrchestrationError::EmptyResult)?
            .to_string();

        if let Some(marker) = guard::screen_summary(&answer) {
            warn!("Model answer flagged as error content ('{}')", marker);
            return Err(OrchestrationError::FlaggedContent {
                marker,
                excerpt: guard::excerpt(&answer, 200),
            });
        }

        info!(
            "Orchestration finished: {} chars, {} tool calls, {} round trips",
            answer.len(),
            invocations.len(),
            round_trips
        );
        Ok(Orchestration {
            answer,
            invocations,
            round_trips,
        })
    }
}
