//! Built-in sentinel tool that terminates the agent loop.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{Tool, ToolContext};

/// Name the iteration controller recognizes as the termination signal.
pub const COMPLETE_TASK_TOOL_NAME: &str = "complete_task";

/// Sentinel tool whose input schema is the caller's requested output schema.
///
/// Its `run` returns the input unchanged; the controller stores that value as
/// the run's final output and exits the loop.
pub struct CompleteTaskTool {
    output_schema: Value,
    usage: String,
}

impl CompleteTaskTool {
    pub fn new(output_schema: Value, usage: impl Into<String>) -> Self {
        Self {
            output_schema,
            usage: usage.into(),
        }
    }
}

#[async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &str {
        COMPLETE_TASK_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Completes the user query and outputs the final results"
    }

    fn input_schema(&self) -> Value {
        self.output_schema.clone()
    }

    fn usage(&self) -> &str {
        &self.usage
    }

    async fn run(
        &self,
        _ctx: &ToolContext,
        input: &Map<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        Ok(Some(Value::Object(input.clone())))
    }
}
