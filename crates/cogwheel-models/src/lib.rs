//! Model-client abstraction.
//!
//! The runtime never talks to a network endpoint itself; it consumes
//! implementations of [`CompletionModel`] supplied by the caller, either as a
//! single blocking completion or as a finite chunk stream.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use cogwheel_core::{Message, TokenUsage};

mod registry;

pub use registry::ModelRegistry;

/// A single completion request: rendered system prompt plus conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub instructions: String,
    pub messages: Vec<Message>,
}

/// Result of a blocking completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// One chunk of a streamed completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// A fragment of the model's text output.
    Text { text: String },

    /// A fragment of reasoning prose.
    Reasoning { text: String },

    /// Token accounting; may interleave with other chunks.
    Usage {
        usage: TokenUsage,
        #[serde(skip_serializing_if = "Option::is_none")]
        cost: Option<f64>,
    },
}

/// A finite stream of completion chunks, closed on server end-of-turn.
pub type ChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamChunk>> + Send>>;

/// The model-client trait consumed by the runners.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Provider identifier (e.g. "openrouter", "claude").
    fn name(&self) -> &str;

    /// Blocking completion of a single turn.
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<Completion>;

    /// Incremental completion of a single turn.
    async fn stream_complete(&self, request: &CompletionRequest) -> anyhow::Result<ChunkStream>;
}
