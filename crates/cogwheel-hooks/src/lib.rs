//! Lifecycle callbacks fired around model and tool invocations.
//!
//! Four hooks observe (and may influence) agent execution. A hook error is
//! folded into the controller's error-injection policy rather than aborting
//! the run; `before_tool` may additionally substitute a result, in which case
//! the tool body is skipped.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use cogwheel_core::{Message, TokenUsage};

mod logging;
mod redact;

pub use logging::LoggingCallback;
pub use redact::{redact, DEFAULT_REDACT_MAX_LEN};

/// Lifecycle hooks for agent execution. Invoked synchronously, in-band with
/// the iteration controller.
#[async_trait]
pub trait Callback: Send + Sync {
    /// Called before each model invocation.
    async fn before_model(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        model: &str,
        prompts: &str,
        messages: &[Message],
    ) -> anyhow::Result<()>;

    /// Called after a successful model invocation, before dispatch.
    async fn after_model(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        model: &str,
        prompts: &str,
        messages: &[Message],
        output: &str,
        usage: Option<&TokenUsage>,
    ) -> anyhow::Result<()>;

    /// Called before a tool executes. Returning `Ok(Some(value))` substitutes
    /// the tool's result: the tool body is skipped and `value` is recorded as
    /// the tool message. Never fired for the `complete_task` sentinel.
    async fn before_tool(
        &self,
        cancel: &CancellationToken,
        tool_name: &str,
        input: &Map<String, Value>,
    ) -> anyhow::Result<Option<Value>>;

    /// Called after a tool executed successfully. Never fired for the
    /// `complete_task` sentinel.
    async fn after_tool(
        &self,
        cancel: &CancellationToken,
        tool_name: &str,
        input: &Map<String, Value>,
        output: Option<&Value>,
    ) -> anyhow::Result<()>;
}

/// Callback that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

#[async_trait]
impl Callback for NoopCallback {
    async fn before_model(
        &self,
        _cancel: &CancellationToken,
        _provider: &str,
        _model: &str,
        _prompts: &str,
        _messages: &[Message],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_model(
        &self,
        _cancel: &CancellationToken,
        _provider: &str,
        _model: &str,
        _prompts: &str,
        _messages: &[Message],
        _output: &str,
        _usage: Option<&TokenUsage>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn before_tool(
        &self,
        _cancel: &CancellationToken,
        _tool_name: &str,
        _input: &Map<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }

    async fn after_tool(
        &self,
        _cancel: &CancellationToken,
        _tool_name: &str,
        _input: &Map<String, Value>,
        _output: Option<&Value>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
