//! Plugin registry: explicit id → implementation lookup.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::{Plugin, PluginError};

/// Maps plugin ids to shared `Plugin` implementations.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::builtin::StaticPlugin));
        registry
    }

    /// Register a plugin under its own id, replacing any previous entry.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Option<Arc<dyn Plugin>> {
        let id = plugin.id().to_owned();
        debug!(plugin_id = %id, "registering plugin");
        self.plugins.insert(id, plugin)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Look up `plugin_id` and invoke it.
    pub async fn execute(
        &self,
        plugin_id: &str,
        node_id: &str,
        params: &Value,
    ) -> Result<Value, PluginError> {
        let plugin = self
            .get(plugin_id)
            .ok_or_else(|| PluginError::NotRegistered(plugin_id.to_owned()))?;
        plugin.execute(node_id, params).await
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.ids())
            .finish()
    }
}
