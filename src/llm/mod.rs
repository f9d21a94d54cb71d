pub mod auth;
pub mod inference;

pub use auth::{Credential, TokenProvider};
pub use inference::ChatClient;

use crate::tools::ToolDescriptor;
use crate::types::{ChatMessage, ModelReply};
use async_trait::async_trait;
use thiserror::Error;

/// Failure talking to the remote model.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No usable credential, or the token exchange failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The reply could not be decoded into a model message.
    #[error("could not decode model reply: {0}")]
    Decode(String),
}

/// A conversational model that understands tool calling.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the whole conversation with the tool list attached.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[&ToolDescriptor],
    ) -> Result<ModelReply, LlmError>;
}
