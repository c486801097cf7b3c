//! Core value types and errors for the cogwheel agent runtime.
//!
//! Everything here is plain data: conversation messages, tool-call records,
//! run requests/responses, stream events, and the error taxonomy shared by
//! all other crates in the workspace.

pub mod error;
pub mod request;
pub mod types;

pub use error::{AgentError, Result};
pub use request::{AgentEvent, AgentRequest, AgentResponse, DEFAULT_MAX_MESSAGE_HISTORY};
pub use types::{Message, Role, TokenUsage, ToolCall};
