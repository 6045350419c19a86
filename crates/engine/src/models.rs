//! Core domain models for the scenario engine.
//!
//! These types are the source of truth for what a scenario looks like in
//! memory. Field names serialise in camelCase so the same structs read and
//! write the scenario and template documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EngineError;

/// Category assigned to nodes that don't name one.
pub const DEFAULT_CATEGORY: &str = "default";

fn default_category() -> String {
    DEFAULT_CATEGORY.to_owned()
}

// ---------------------------------------------------------------------------
// PluginRef / ContextBinding / Position
// ---------------------------------------------------------------------------

/// Names the external producer of a node's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRef {
    /// Registry id of the plugin.
    pub plugin_id: String,
    /// Opaque configuration handed to the plugin.
    #[serde(default)]
    pub config: Value,
}

impl PluginRef {
    pub fn new(plugin_id: impl Into<String>, config: Value) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            config,
        }
    }
}

/// Where a node's result is written in the context store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBinding {
    /// Top-level context key.
    pub key: String,
    /// Optional dotted path under `key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ContextBinding {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: None,
        }
    }

    pub fn at_path(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: Some(path.into()),
        }
    }

    pub(crate) fn check(&self, node_id: &str) -> Result<(), EngineError> {
        if self.key.trim().is_empty() {
            return Err(EngineError::invalid_node(
                Some(node_id),
                "context binding has an empty key",
            ));
        }
        Ok(())
    }
}

/// Editor coordinates. Opaque to execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single prompt node in the scenario graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier within the graph (referenced by edges). Immutable.
    id: String,
    /// Human-readable title.
    pub label: String,
    /// Prompt template; may contain `{{…}}` tokens.
    #[serde(default)]
    pub content: String,
    /// Free-form grouping label. Changed through [`Graph::set_category`] so the
    /// graph's category set stays complete.
    ///
    /// [`Graph::set_category`]: crate::graph::Graph::set_category
    #[serde(default = "default_category")]
    pub(crate) category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_ref: Option<PluginRef>,
    /// Changed through [`Graph::set_binding`], which validates the key.
    ///
    /// [`Graph::set_binding`]: crate::graph::Graph::set_binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) context_binding: Option<ContextBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    /// Create a node whose label defaults to its id.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            content: content.into(),
            category: default_category(),
            plugin_ref: None,
            context_binding: None,
            position: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn context_binding(&self) -> Option<&ContextBinding> {
        self.context_binding.as_ref()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_plugin(mut self, plugin: PluginRef) -> Self {
        self.plugin_ref = Some(plugin);
        self
    }

    pub fn with_binding(mut self, binding: ContextBinding) -> Self {
        self.context_binding = Some(binding);
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    /// Copy of this node under a different id. Only the merge engine and
    /// template extraction synthesize ids.
    pub(crate) fn clone_with_id(&self, id: String) -> Self {
        Self { id, ..self.clone() }
    }

    /// Creation-time checks. Normalises an empty category to the default.
    pub fn validate(&mut self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::invalid_node(None, "missing id"));
        }
        if self.label.trim().is_empty() {
            return Err(EngineError::invalid_node(Some(&self.id), "missing label"));
        }
        if let Some(pos) = self.position {
            if !pos.x.is_finite() || !pos.y.is_finite() {
                return Err(EngineError::invalid_node(
                    Some(&self.id),
                    "position coordinates must be finite",
                ));
            }
        }
        if let Some(binding) = &self.context_binding {
            binding.check(&self.id)?;
        }
        if self.category.trim().is_empty() {
            self.category = default_category();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge: `target` follows (depends on) `source`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_category_deserialises_to_default() {
        let node: Node = serde_json::from_value(json!({
            "id": "n1",
            "label": "First",
            "content": "hi"
        }))
        .unwrap();
        assert_eq!(node.category, DEFAULT_CATEGORY);
        assert!(node.plugin_ref.is_none());
    }

    #[test]
    fn camel_case_fields_are_read() {
        let node: Node = serde_json::from_value(json!({
            "id": "n1",
            "label": "Ask",
            "content": "",
            "pluginRef": { "pluginId": "static", "config": { "value": 1 } },
            "contextBinding": { "key": "answers", "path": "q1" }
        }))
        .unwrap();
        assert_eq!(node.plugin_ref.unwrap().plugin_id, "static");
        assert_eq!(node.context_binding, Some(ContextBinding::at_path("answers", "q1")));
    }

    #[test]
    fn missing_label_fails_deserialisation() {
        let result = serde_json::from_value::<Node>(json!({ "id": "n1" }));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_position_fails_deserialisation() {
        let result = serde_json::from_value::<Node>(json!({
            "id": "n1",
            "label": "x",
            "position": { "x": "left" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_blank_id_and_label() {
        let mut blank_id = Node::new("  ", "x");
        assert!(matches!(
            blank_id.validate(),
            Err(EngineError::InvalidNode { node_id: None, .. })
        ));

        let mut blank_label = Node::new("n", "x").with_label("");
        assert!(matches!(
            blank_label.validate(),
            Err(EngineError::InvalidNode { node_id: Some(id), .. }) if id == "n"
        ));
    }

    #[test]
    fn validate_normalises_empty_category() {
        let mut node = Node::new("n", "x").with_category("");
        node.validate().unwrap();
        assert_eq!(node.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn validate_rejects_non_finite_position() {
        let mut node = Node::new("n", "x").with_position(f64::NAN, 0.0);
        assert!(node.validate().is_err());
    }
}
