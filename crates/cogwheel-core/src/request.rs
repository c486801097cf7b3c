//! Run request/response value types and validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::types::{Message, Role, TokenUsage, ToolCall};

/// Default cap on the conversation history kept during a run.
pub const DEFAULT_MAX_MESSAGE_HISTORY: usize = 100;

/// A single agent run request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Conversation history; must be non-empty and end with a user message.
    pub messages: Vec<Message>,

    /// Iteration budget for the think/act loop. Must be positive.
    pub max_iterations: u32,

    /// Cap on consecutive recoverable errors. Zero disables the cap.
    #[serde(default)]
    pub max_retries: u32,

    /// JSON schema of the final answer; becomes the input schema of the
    /// built-in `complete_task` tool.
    pub output_schema: Value,

    /// Human-oriented usage hint for the final answer.
    #[serde(default)]
    pub output_usage: String,
}

impl AgentRequest {
    pub fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(AgentError::InvalidInput("messages must not be empty".into()));
        }
        if self.max_iterations == 0 {
            return Err(AgentError::InvalidInput(
                "max_iterations must be positive".into(),
            ));
        }
        match self.messages.last() {
            Some(last) if last.role == Role::User => Ok(()),
            _ => Err(AgentError::InvalidInput(
                "last message must be a user message".into(),
            )),
        }
    }
}

/// Result of a blocking agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Final output; its shape matches the request's `output_schema`.
    pub output: Value,
    pub usage: TokenUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Events emitted during a streaming agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Free-form assistant text.
    Text { text: String },

    /// Reasoning prose surfaced verbatim.
    Reasoning { text: String },

    /// A tool call, tentative while `partial` is true.
    UseTool { call: ToolCall, partial: bool },

    /// Terminal failure of the run.
    Error { message: String },
}
