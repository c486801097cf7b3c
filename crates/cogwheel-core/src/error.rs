use thiserror::Error;

/// Errors surfaced by the agent runtime.
///
/// The iteration controller distinguishes recoverable failures (injected back
/// into the conversation so the model can self-correct) from fatal ones
/// (returned to the caller, or emitted as a terminal error event when
/// streaming). The distinction lives in the controller, not here.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("tool '{0}' already registered")]
    ToolAlreadyRegistered(String),

    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    #[error("model invocation failed: {0}")]
    ModelInvocation(String),

    #[error("failed to decode tool call: {0}")]
    Decode(String),

    #[error("tool '{name}' execution failed: {message}")]
    ToolExecution { name: String, message: String },

    #[error("callback {hook} failed: {message}")]
    Callback { hook: String, message: String },

    #[error("exceeded max retries ({0}) due to consecutive errors")]
    RetriesExceeded(u32),

    #[error("agent exceeded max iterations: {0}")]
    MaxIterations(u32),

    #[error("run cancelled")]
    Cancelled,

    #[error("failed to serialize tool output: {0}")]
    Marshal(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
