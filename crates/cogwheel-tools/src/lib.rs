//! Tool abstraction for the agent runtime.
//!
//! Tools are capabilities exposed to the model during a run. Each tool
//! implements the [`Tool`] trait; the iteration controller looks them up in a
//! [`ToolRegistry`] and invokes them with a [`ToolContext`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use cogwheel_core::ToolCall;

mod complete_task;
mod registry;

pub use complete_task::{CompleteTaskTool, COMPLETE_TASK_TOOL_NAME};
pub use registry::ToolRegistry;

/// Per-run context handed to every tool invocation.
///
/// Carries the run's cancellation token, the session key-value map, and the
/// ordered log of tool calls made so far. Long-running tools are expected to
/// honor `cancel` themselves; the runtime does not forcibly terminate them.
#[derive(Clone)]
pub struct ToolContext {
    pub cancel: CancellationToken,
    pub session: Arc<tokio::sync::RwLock<HashMap<String, Value>>>,
    pub calls: Arc<ToolCallLog>,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            session: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            calls: Arc::new(ToolCallLog::new()),
        }
    }
}

/// Ordered, concurrency-safe history of tool calls within one run.
///
/// The iteration controller is the sole writer; tools and callbacks may read.
#[derive(Default)]
pub struct ToolCallLog {
    calls: RwLock<Vec<ToolCall>>,
}

impl ToolCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed call record.
    pub fn append(&self, call: ToolCall) {
        self.calls.write().unwrap().push(call);
    }

    /// Whether a tool with the given name has been called during this run.
    pub fn has_called(&self, name: &str) -> bool {
        self.calls.read().unwrap().iter().any(|c| c.name == name)
    }

    /// All recorded calls for a given tool name, as a fresh copy.
    pub fn find_calls(&self, name: &str) -> Vec<ToolCall> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the full log.
    pub fn all(&self) -> Vec<ToolCall> {
        self.calls.read().unwrap().clone()
    }
}

/// The core tool trait. Every tool exposed to the model implements this.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to the model. Unique within a registry.
    fn name(&self) -> &str;

    /// Human-readable description for the model.
    fn description(&self) -> &str;

    /// JSON Schema describing the accepted input.
    fn input_schema(&self) -> Value;

    /// JSON Schema describing the output, if declared.
    fn output_schema(&self) -> Option<Value> {
        None
    }

    /// Usage example shown in the tool catalog. Empty string to omit.
    fn usage(&self) -> &str {
        ""
    }

    /// Execute the tool. `Ok(None)` means success with no result to report.
    async fn run(&self, ctx: &ToolContext, input: &Map<String, Value>)
        -> anyhow::Result<Option<Value>>;
}
