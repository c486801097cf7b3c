//! Registry of named model clients.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::CompletionModel;

/// Concurrency-safe map from provider name to model client.
///
/// Lets an application wire several providers and have agents select one by
/// name at run time.
#[derive(Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, Arc<dyn CompletionModel>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model under a name, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, model: Arc<dyn CompletionModel>) {
        self.models.write().unwrap().insert(name.into(), model);
    }

    pub fn unregister(&self, name: &str) {
        self.models.write().unwrap().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CompletionModel>> {
        self.models.read().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.read().unwrap().contains_key(name)
    }

    /// Names of all registered models. Order is unspecified.
    pub fn list_ids(&self) -> Vec<String> {
        self.models.read().unwrap().keys().cloned().collect()
    }
}
