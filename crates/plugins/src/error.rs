//! Plugin-level error type.

use thiserror::Error;

/// Errors returned by a plugin's `execute` method.
///
/// The executor uses the variant to decide retry behaviour:
/// - `Retryable`: re-invoked with exponential back-off, up to the configured limit.
/// - `Fatal`: surfaced to the operator immediately.
///
/// Neither variant ends the run: the step stays current and can be retried
/// or answered manually.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// Transient failure; the executor may re-invoke the plugin.
    #[error("retryable plugin error: {0}")]
    Retryable(String),

    /// Permanent failure for this invocation.
    #[error("plugin failed: {0}")]
    Fatal(String),

    /// No plugin is registered under the requested id.
    #[error("no plugin registered under id '{0}'")]
    NotRegistered(String),
}

impl PluginError {
    /// Whether the executor should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}
