//! Registry of tools available to an agent.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cogwheel_core::{AgentError, Result};

use crate::Tool;

/// Unique-name map of tool handles, safe for concurrent use.
///
/// Read-dominant during a loop iteration; written at construction and on each
/// `complete_task` registration.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Fails if a tool with the same name already exists.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let mut tools = self.tools.write().unwrap();
        let name = tool.name().to_string();
        if tools.contains_key(&name) {
            return Err(AgentError::ToolAlreadyRegistered(name));
        }
        tools.insert(name, tool);
        Ok(())
    }

    /// Remove a tool by name.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut tools = self.tools.write().unwrap();
        if tools.remove(name).is_none() {
            return Err(AgentError::ToolNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        let tools = self.tools.read().unwrap();
        tools
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// Snapshot of all registered tools. Order is unspecified.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.read().unwrap().values().cloned().collect()
    }

    /// Names of all registered tools. Order is unspecified.
    pub fn names(&self) -> Vec<String> {
        self.tools.read().unwrap().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().unwrap().contains_key(name)
    }
}
