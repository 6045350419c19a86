//! `engine` crate: scenario graph model, execution planning, context
//! propagation, template merging, and the step-wise executor.

pub mod context;
pub mod dag;
pub mod error;
pub mod executor;
pub mod graph;
pub mod merge;
pub mod models;
pub mod scenario;
pub mod template;

pub use context::ContextStore;
pub use dag::{execution_plan, unresolved_references, validate_graph, UnresolvedReference};
pub use error::EngineError;
pub use executor::{
    ExecutorConfig, RunState, RunSummary, ScenarioExecutor, ScenarioRun, StepOutcome, StepPrompt,
};
pub use graph::Graph;
pub use merge::{mount, MountReport, Template};
pub use models::{ContextBinding, Edge, Node, PluginRef, Position};
pub use scenario::{ImportIssue, Scenario};
pub use template::{interpolate, Resolve};
