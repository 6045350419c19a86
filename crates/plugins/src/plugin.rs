//! The `Plugin` trait: the contract every external result producer must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::PluginError;

/// A producer of node results.
///
/// The executor calls a plugin only for nodes that declare a plugin
/// reference. `params` is the node's plugin configuration blob.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Registry key, matched against a node's `pluginRef.pluginId`.
    fn id(&self) -> &str;

    /// Produce the result for `node_id`.
    async fn execute(&self, node_id: &str, params: &Value) -> Result<Value, PluginError>;
}

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

/// The `{ success, data, error? }` envelope a plugin host answers with.
/// [`EnvelopePlugin`](crate::envelope::EnvelopePlugin) turns it into a
/// `Result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginResponse {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }
}

impl From<PluginResponse> for Result<Value, PluginError> {
    fn from(resp: PluginResponse) -> Self {
        if resp.success {
            Ok(resp.data)
        } else {
            Err(PluginError::Fatal(
                resp.error.unwrap_or_else(|| "plugin reported failure".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_envelope_becomes_fatal_error() {
        let resp: PluginResponse =
            serde_json::from_value(json!({ "success": false, "error": "quota exceeded" })).unwrap();
        let result: Result<Value, PluginError> = resp.into();
        assert_eq!(result, Err(PluginError::Fatal("quota exceeded".into())));
    }

    #[test]
    fn failed_envelope_without_message_gets_generic_error() {
        let resp: PluginResponse = serde_json::from_value(json!({ "success": false })).unwrap();
        let result: Result<Value, PluginError> = resp.into();
        assert!(matches!(result, Err(PluginError::Fatal(msg)) if msg.contains("failure")));
    }

    #[test]
    fn successful_envelope_yields_data() {
        let resp: PluginResponse =
            serde_json::from_value(json!({ "success": true, "data": { "score": 3 } })).unwrap();
        let result: Result<Value, PluginError> = resp.into();
        assert_eq!(result, Ok(json!({ "score": 3 })));
    }

    #[test]
    fn error_field_is_omitted_on_success() {
        let text = serde_json::to_string(&PluginResponse::ok(json!("hi"))).unwrap();
        assert_eq!(text, r#"{"success":true,"data":"hi"}"#);
    }
}
