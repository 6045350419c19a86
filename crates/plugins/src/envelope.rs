//! Adapter for plugin hosts that answer with a raw JSON envelope.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{Plugin, PluginError, PluginResponse};

/// Wraps a handler returning `{ success, data, error? }` JSON as a [`Plugin`].
///
/// A failed envelope becomes [`PluginError::Fatal`]; so does a reply that
/// isn't an envelope at all.
pub struct EnvelopePlugin<F> {
    id: String,
    handler: F,
}

impl<F> EnvelopePlugin<F>
where
    F: Fn(&str, &Value) -> Value + Send + Sync,
{
    pub fn new(id: impl Into<String>, handler: F) -> Self {
        Self {
            id: id.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F> Plugin for EnvelopePlugin<F>
where
    F: Fn(&str, &Value) -> Value + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, node_id: &str, params: &Value) -> Result<Value, PluginError> {
        let reply = (self.handler)(node_id, params);
        let response: PluginResponse = serde_json::from_value(reply).map_err(|e| {
            PluginError::Fatal(format!("plugin '{}' sent a malformed envelope: {e}", self.id))
        })?;
        debug!(plugin_id = %self.id, node_id, success = response.success, "envelope received");
        response.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn successful_envelope_yields_its_data() {
        let plugin = EnvelopePlugin::new("host", |node_id: &str, params: &Value| {
            json!({ "success": true, "data": { "node": node_id, "echo": params["q"] } })
        });
        let out = plugin.execute("n1", &json!({ "q": "hi" })).await.unwrap();
        assert_eq!(out, json!({ "node": "n1", "echo": "hi" }));
    }

    #[tokio::test]
    async fn failed_envelope_is_fatal() {
        let plugin = EnvelopePlugin::new("host", |_: &str, _: &Value| {
            serde_json::to_value(PluginResponse::failed("quota exceeded")).unwrap()
        });
        let err = plugin.execute("n1", &json!({})).await.unwrap_err();
        assert_eq!(err, PluginError::Fatal("quota exceeded".into()));
    }

    #[tokio::test]
    async fn non_envelope_reply_is_fatal() {
        let plugin = EnvelopePlugin::new("host", |_: &str, _: &Value| json!("just text"));
        let err = plugin.execute("n1", &json!({})).await.unwrap_err();
        assert!(matches!(err, PluginError::Fatal(msg) if msg.contains("malformed envelope")));
    }
}
