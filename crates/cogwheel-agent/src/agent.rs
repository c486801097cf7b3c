//! Agent definition.

use std::fmt;
use std::sync::Arc;

use cogwheel_core::{AgentError, Result};
use cogwheel_tools::Tool;

/// An agent: identity, instructions, and the tools it may use.
///
/// Immutable for the duration of a run.
#[derive(Clone, Default)]
pub struct Agent {
    /// Identifier for this agent.
    pub name: String,

    /// Brief explanation of the agent's purpose.
    pub description: String,

    /// System-prompt guidelines for the agent.
    pub instructions: String,

    /// Model provider identifier, if pinned.
    pub model_provider: Option<String>,

    /// Model identifier, if pinned.
    pub model: Option<String>,

    /// Tools available to this agent.
    pub tools: Vec<Arc<dyn Tool>>,
}

impl Agent {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AgentError::InvalidConfiguration(
                "agent name is required".into(),
            ));
        }
        if self.description.is_empty() {
            return Err(AgentError::InvalidConfiguration(
                "agent description is required".into(),
            ));
        }
        if self.instructions.is_empty() {
            return Err(AgentError::InvalidConfiguration(
                "agent instructions are required".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("model_provider", &self.model_provider)
            .field("model", &self.model)
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
