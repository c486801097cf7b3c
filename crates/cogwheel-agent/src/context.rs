//! Per-run execution context.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use cogwheel_core::{Message, ToolCall};
use cogwheel_tools::{ToolCallLog, ToolContext};

use crate::agent::Agent;

/// State for one agent run.
///
/// Holds the agent reference, the conversation as supplied at run start, the
/// session key-value map, and the ordered tool-call log. The iteration
/// controller owns the working message list and is the sole writer of the
/// log; tools and callbacks read through the [`ToolContext`] handed to them.
pub struct AgentContext {
    pub agent: Arc<Agent>,

    /// Conversation history at run start. The controller's working list
    /// evolves separately (it is compacted and appended to during the run).
    pub messages: Vec<Message>,

    pub session: Arc<tokio::sync::RwLock<HashMap<String, Value>>>,

    pub calls: Arc<ToolCallLog>,
}

impl AgentContext {
    pub fn new(agent: Arc<Agent>, messages: Vec<Message>) -> Self {
        Self {
            agent,
            messages,
            session: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            calls: Arc::new(ToolCallLog::new()),
        }
    }

    /// Context handed to a tool invocation, riding the cancellation token.
    pub fn tool_context(&self, cancel: CancellationToken) -> ToolContext {
        ToolContext {
            cancel,
            session: self.session.clone(),
            calls: self.calls.clone(),
        }
    }

    pub fn append_tool_call(&self, call: ToolCall) {
        self.calls.append(call);
    }

    pub fn has_called(&self, name: &str) -> bool {
        self.calls.has_called(name)
    }

    pub fn find_calls(&self, name: &str) -> Vec<ToolCall> {
        self.calls.find_calls(name)
    }
}
