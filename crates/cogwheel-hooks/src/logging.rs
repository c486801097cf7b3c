//! Callback that traces lifecycle events with redacted payloads.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use cogwheel_core::{Message, TokenUsage};

use crate::redact::{redact, DEFAULT_REDACT_MAX_LEN};
use crate::Callback;

/// Emits `tracing` lines for every hook, passing tool inputs and outputs
/// through the sensitive-data redactor first.
#[derive(Debug, Clone, Copy)]
pub struct LoggingCallback {
    max_len: usize,
}

impl LoggingCallback {
    pub fn new() -> Self {
        Self {
            max_len: DEFAULT_REDACT_MAX_LEN,
        }
    }

    /// Override the string truncation limit used when tracing values.
    pub fn with_max_len(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Default for LoggingCallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Callback for LoggingCallback {
    async fn before_model(
        &self,
        _cancel: &CancellationToken,
        provider: &str,
        model: &str,
        _prompts: &str,
        messages: &[Message],
    ) -> anyhow::Result<()> {
        debug!(provider, model, messages = messages.len(), "Calling model");
        Ok(())
    }

    async fn after_model(
        &self,
        _cancel: &CancellationToken,
        provider: &str,
        model: &str,
        _prompts: &str,
        _messages: &[Message],
        output: &str,
        usage: Option<&TokenUsage>,
    ) -> anyhow::Result<()> {
        let output = redact(&Value::String(output.to_string()), self.max_len);
        debug!(
            provider,
            model,
            output = %output,
            input_tokens = usage.map(|u| u.input_tokens),
            output_tokens = usage.map(|u| u.output_tokens),
            "Model response received"
        );
        Ok(())
    }

    async fn before_tool(
        &self,
        _cancel: &CancellationToken,
        tool_name: &str,
        input: &Map<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        let input = redact(&Value::Object(input.clone()), self.max_len);
        info!(tool = tool_name, input = %input, "Calling tool");
        Ok(None)
    }

    async fn after_tool(
        &self,
        _cancel: &CancellationToken,
        tool_name: &str,
        _input: &Map<String, Value>,
        output: Option<&Value>,
    ) -> anyhow::Result<()> {
        let output = output.map(|v| redact(v, self.max_len));
        match output {
            Some(output) => info!(tool = tool_name, output = %output, "Tool completed"),
            None => info!(tool = tool_name, "Tool completed, no results"),
        }
        Ok(())
    }
}
