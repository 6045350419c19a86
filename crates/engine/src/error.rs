//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the scenario engine (validation, merge, execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// A node failed creation-time validation (missing id/label, bad position).
    #[error("invalid node{}: {reason}", quoted_id(.node_id))]
    InvalidNode {
        node_id: Option<String>,
        reason: String,
    },

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the graph.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// An edge would connect a node to itself.
    #[error("self-loop on node '{0}' is not allowed")]
    SelfLoop(String),

    /// Cycle check found a back-edge.
    #[error("scenario graph contains a cycle through '{0}'")]
    CycleDetected(String),

    /// An operation named a node the graph doesn't contain.
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    // ------ Merge errors ------

    /// The namespace is empty or contains characters that break ids/tokens.
    #[error("invalid namespace '{0}'")]
    InvalidNamespace(String),

    /// A synthesized id already exists in the host graph.
    #[error("namespace '{namespace}' already in use: host already has node '{node_id}'")]
    NamespaceCollision {
        namespace: String,
        node_id: String,
    },

    /// The template itself is inconsistent.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    // ------ Execution errors ------

    /// A step was requested with no run in progress.
    #[error("no active run")]
    NoActiveRun,

    /// `start` was called while the run is still in progress.
    #[error("run {0} is already in progress")]
    RunInProgress(uuid::Uuid),

    /// The scenario has no nodes to execute.
    #[error("scenario has no nodes to execute")]
    EmptyPlan,

    /// A plugin step was requested for a node without a plugin reference.
    #[error("node '{0}' has no plugin reference")]
    NoPluginRef(String),

    // ------ Documents ------

    /// A scenario or template document could not be parsed at all.
    #[error("malformed document: {0}")]
    Document(#[from] serde_json::Error),
}

fn quoted_id(node_id: &Option<String>) -> String {
    node_id
        .as_deref()
        .map(|id| format!(" '{id}'"))
        .unwrap_or_default()
}

impl EngineError {
    pub(crate) fn invalid_node(node_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self::InvalidNode {
            node_id: node_id.map(str::to_owned),
            reason: reason.into(),
        }
    }
}
