//! Agent runtime — drives a model through the think/act loop.
//!
//! The runtime assembles a system prompt from the agent and its tool catalog,
//! invokes the model (blocking or streaming), decodes the tool call the model
//! committed to (pure-JSON or XML-enveloped), dispatches it through the tool
//! registry with lifecycle hooks, and feeds the result back into the
//! conversation until the `complete_task` sentinel fires.

pub mod agent;
pub mod context;
pub mod decode;
pub mod prompt;
pub mod runner;
pub mod stream_json;
pub mod stream_xml;
pub mod template;

pub use agent::Agent;
pub use context::AgentContext;
pub use decode::{DecodeProgress, JsonToolCallDecoder, ToolCallDecoder, XmlToolCallDecoder};
pub use runner::{AgentEventStream, AgentRunner, RunnerConfig, WireFormat};
pub use stream_json::StreamJsonParser;
pub use stream_xml::XmlEnvelopeParser;
