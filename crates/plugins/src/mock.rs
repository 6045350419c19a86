//! `MockPlugin`: a test double for `Plugin`.
//!
//! Useful in unit and integration tests where a real plugin is either
//! unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::{Plugin, PluginError};

/// Behaviour injected into `MockPlugin` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Fail with `Retryable` for the first `failures` calls, then return the value.
    FlakyThen { failures: usize, value: Value },
}

/// A single recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub node_id: String,
    pub params: Value,
}

/// A mock plugin that records every call it receives and returns a
/// programmer-specified result.
pub struct MockPlugin {
    /// Registry id.
    pub id: String,
    /// What the plugin will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All invocations seen by this plugin (in call order).
    pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockPlugin {
    fn with_behaviour(id: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            id: id.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn returning(id: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(id, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(id, MockBehaviour::FailFatal(msg.into()))
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(id, MockBehaviour::FailRetryable(msg.into()))
    }

    /// Create a mock that fails `failures` times before succeeding.
    pub fn flaky(id: impl Into<String>, failures: usize, value: Value) -> Self {
        Self::with_behaviour(id, MockBehaviour::FlakyThen { failures, value })
    }

    /// Number of times this plugin has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Snapshot of every recorded call.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, node_id: &str, params: &Value) -> Result<Value, PluginError> {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(MockCall {
                node_id: node_id.to_owned(),
                params: params.clone(),
            });
            calls.len()
        };

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::FailRetryable(msg) => Err(PluginError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(PluginError::Fatal(msg.clone())),
            MockBehaviour::FlakyThen { failures, value } => {
                if seen <= *failures {
                    Err(PluginError::Retryable(format!("transient failure #{seen}")))
                } else {
                    Ok(value.clone())
                }
            }
        }
    }
}
