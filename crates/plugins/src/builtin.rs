//! Built-in plugins that need no external service.

use async_trait::async_trait;
use serde_json::Value;

use crate::{Plugin, PluginError};

/// Returns the `value` field of its configuration verbatim.
///
/// Handy for wiring fixed answers into a scenario:
/// `{ "pluginId": "static", "config": { "value": "…" } }`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticPlugin;

#[async_trait]
impl Plugin for StaticPlugin {
    fn id(&self) -> &str {
        "static"
    }

    async fn execute(&self, node_id: &str, params: &Value) -> Result<Value, PluginError> {
        params.get("value").cloned().ok_or_else(|| {
            PluginError::Fatal(format!("node '{node_id}': static plugin config has no 'value'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn returns_configured_value() {
        let out = StaticPlugin
            .execute("n", &json!({ "value": { "tone": "formal" } }))
            .await
            .unwrap();
        assert_eq!(out, json!({ "tone": "formal" }));
    }

    #[tokio::test]
    async fn missing_value_is_fatal() {
        let err = StaticPlugin.execute("n", &json!({})).await.unwrap_err();
        assert!(matches!(err, PluginError::Fatal(msg) if msg.contains("'n'")));
    }
}
