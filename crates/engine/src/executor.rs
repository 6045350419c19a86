//! Scenario execution engine.
//!
//! A [`ScenarioRun`] is the per-run state machine:
//! 1. `start` computes the execution plan and clears the response table.
//! 2. `current_step` interpolates the current node against the response
//!    table layered over the context store.
//! 3. `submit` (manual answer) or [`ScenarioExecutor::run_plugin`] records the
//!    result, commits it to the node's context binding, and advances.
//! 4. Past the last node the run returns to `Idle` and hands its responses
//!    back in a [`RunSummary`]. `cancel` drops the plan without rolling back
//!    commits already made.
//!
//! The context store is owned by the caller and passed in per call.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use plugins::{PluginError, PluginRegistry};

use crate::context::{path_segments, write_path, ContextStore};
use crate::dag::execution_plan;
use crate::graph::Graph;
use crate::models::{Node, PluginRef};
use crate::template::{interpolate, interpolate_value, render_value, Resolve};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of times a retryable plugin failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    /// Interpolate string leaves of a node's plugin config before invoking it.
    pub interpolate_plugin_params: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            interpolate_plugin_params: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Run state, prompts, outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Cancelled,
}

/// Node id → captured result for the current run.
pub type ResponseTable = IndexMap<String, String>;

/// What the operator (or a plugin) is asked to answer.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPrompt {
    pub run_id: Uuid,
    pub node_id: String,
    pub label: String,
    /// Node content with tokens resolved.
    pub text: String,
    pub plugin: Option<PluginRef>,
    /// Zero-based index into the plan.
    pub position: usize,
    pub total: usize,
}

/// A finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub plan: Vec<String>,
    pub responses: ResponseTable,
    pub skipped: Vec<String>,
}

/// Result of a step.
#[derive(Debug)]
pub enum StepOutcome {
    /// The result was recorded and the cursor moved to `next`.
    Advanced { node_id: String, next: String },
    /// The last planned node was answered; the run is `Idle` again.
    Completed(RunSummary),
    /// The plugin failed. Nothing was committed; the step is still current.
    PluginFailed { node_id: String, error: PluginError },
    /// The run was cancelled while the plugin was in flight; its result was
    /// dropped.
    Discarded { node_id: String },
    /// Automatic driving stopped at a node that needs a manual answer.
    AwaitingInput { node_id: String },
}

// ---------------------------------------------------------------------------
// Resolver: response table over context store
// ---------------------------------------------------------------------------

/// Resolves bindings against the run's responses first, then the context.
///
/// A binding that names neither a response nor a context key but prefixes
/// response ids (`sec1` for `sec1.a`) resolves to an object assembled from
/// those responses, so `{{sec1.a}}` reaches nodes mounted under a namespace.
pub struct RunResolver<'a> {
    responses: &'a ResponseTable,
    context: &'a ContextStore,
}

impl<'a> RunResolver<'a> {
    pub fn new(responses: &'a ResponseTable, context: &'a ContextStore) -> Self {
        Self { responses, context }
    }

    fn namespace_view(&self, name: &str) -> Option<Value> {
        let prefix = format!("{name}.");
        let mut view = Value::Object(Map::new());
        let mut found = false;
        for (id, response) in self.responses {
            if let Some(rest) = id.strip_prefix(&prefix) {
                write_path(&mut view, path_segments(rest), Value::String(response.clone()));
                found = true;
            }
        }
        found.then_some(view)
    }
}

impl Resolve for RunResolver<'_> {
    fn resolve(&self, name: &str) -> Option<Cow<'_, Value>> {
        if let Some(response) = self.responses.get(name) {
            return Some(Cow::Owned(Value::String(response.clone())));
        }
        if let Some(value) = self.context.get(name, None) {
            return Some(Cow::Borrowed(value));
        }
        self.namespace_view(name).map(Cow::Owned)
    }
}

// ---------------------------------------------------------------------------
// ScenarioRun
// ---------------------------------------------------------------------------

/// State of one execution run over one scenario graph.
#[derive(Debug)]
pub struct ScenarioRun {
    id: Uuid,
    state: RunState,
    plan: Vec<String>,
    cursor: usize,
    responses: ResponseTable,
    skipped: Vec<String>,
    last_error: Option<String>,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl Default for ScenarioRun {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioRun {
    /// A run in the `Idle` state.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Idle,
            plan: Vec::new(),
            cursor: 0,
            responses: ResponseTable::new(),
            skipped: Vec::new(),
            last_error: None,
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }

    /// Plan `graph` and enter `Running`. Allowed from `Idle` or `Cancelled`.
    ///
    /// # Errors
    /// - [`EngineError::RunInProgress`] if the run is already `Running`.
    /// - [`EngineError::EmptyPlan`] if the graph has no nodes.
    #[instrument(skip(self, graph), fields(run_id))]
    pub fn start(&mut self, graph: &Graph) -> Result<&[String], EngineError> {
        if self.state() == RunState::Running {
            return Err(EngineError::RunInProgress(self.id));
        }
        let plan = execution_plan(graph);
        if plan.is_empty() {
            return Err(EngineError::EmptyPlan);
        }

        self.id = Uuid::new_v4();
        self.state = RunState::Running;
        self.plan = plan;
        self.cursor = 0;
        self.responses.clear();
        self.skipped.clear();
        self.last_error = None;
        self.started_at = Utc::now();
        self.cancel = CancellationToken::new();

        tracing::Span::current().record("run_id", tracing::field::display(self.id));
        info!(
            "run started: {} nodes in order: {:?}",
            self.plan.len(),
            self.plan
        );
        Ok(&self.plan)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state. A run whose cancellation token fired reports
    /// `Cancelled` even before its next step call.
    pub fn state(&self) -> RunState {
        if self.state == RunState::Running && self.cancel.is_cancelled() {
            RunState::Cancelled
        } else {
            self.state
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Token that cancels this run when triggered from anywhere.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn plan(&self) -> &[String] {
        &self.plan
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn responses(&self) -> &ResponseTable {
        &self.responses
    }

    /// Message from the most recent plugin failure on the current step.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Resolver over this run's responses and `context`.
    pub fn resolver<'a>(&'a self, context: &'a ContextStore) -> RunResolver<'a> {
        RunResolver::new(&self.responses, context)
    }

    pub fn current_node_id(&self) -> Option<&str> {
        if !self.is_running() {
            return None;
        }
        self.plan.get(self.cursor).map(String::as_str)
    }

    fn current_node<'g>(&self, graph: &'g Graph) -> Result<&'g Node, EngineError> {
        let id = self.current_node_id().ok_or(EngineError::NoActiveRun)?;
        graph
            .node(id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_owned()))
    }

    /// Interpolated prompt for the current node.
    pub fn current_step(
        &self,
        graph: &Graph,
        context: &ContextStore,
    ) -> Result<StepPrompt, EngineError> {
        let node = self.current_node(graph)?;
        Ok(StepPrompt {
            run_id: self.id,
            node_id: node.id().to_owned(),
            label: node.label.clone(),
            text: interpolate(&node.content, &self.resolver(context)),
            plugin: node.plugin_ref.clone(),
            position: self.cursor,
            total: self.plan.len(),
        })
    }

    /// Record a manual answer for the current node and advance.
    pub fn submit(
        &mut self,
        graph: &Graph,
        context: &mut ContextStore,
        answer: impl Into<String>,
    ) -> Result<StepOutcome, EngineError> {
        self.ensure_running()?;
        let node = self.current_node(graph)?;
        Ok(self.record(node, Value::String(answer.into()), context))
    }

    /// Advance past the current node without recording anything.
    ///
    /// Works even if the planned node has since been removed from the graph.
    pub fn skip(&mut self) -> Result<StepOutcome, EngineError> {
        self.ensure_running()?;
        let node_id = self.plan[self.cursor].clone();
        debug!(node_id = %node_id, "step skipped");
        self.skipped.push(node_id);
        Ok(self.advance())
    }

    /// Stop the run. Context commits already made are kept.
    pub fn cancel(&mut self) -> Result<(), EngineError> {
        if self.state != RunState::Running {
            return Err(EngineError::NoActiveRun);
        }
        self.cancel.cancel();
        info!(
            run_id = %self.id,
            completed = self.cursor,
            planned = self.plan.len(),
            "run cancelled"
        );
        self.discard(RunState::Cancelled);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Fold an externally fired cancellation into the stored state.
    fn observe_cancellation(&mut self) {
        if self.state == RunState::Running && self.cancel.is_cancelled() {
            info!(run_id = %self.id, "run cancelled via token");
            self.discard(RunState::Cancelled);
        }
    }

    fn ensure_running(&mut self) -> Result<(), EngineError> {
        self.observe_cancellation();
        if self.state != RunState::Running {
            return Err(EngineError::NoActiveRun);
        }
        Ok(())
    }

    fn record(&mut self, node: &Node, value: Value, context: &mut ContextStore) -> StepOutcome {
        self.responses
            .insert(node.id().to_owned(), render_value(&value));

        if let Some(binding) = &node.context_binding {
            match binding.path.as_deref() {
                Some(path) => context.set_path(&binding.key, path, value),
                None => context.set(binding.key.clone(), value),
            }
            debug!(
                node_id = %node.id(),
                key = %binding.key,
                path = ?binding.path,
                "result committed to context"
            );
        }

        self.last_error = None;
        self.advance()
    }

    fn advance(&mut self) -> StepOutcome {
        let node_id = self.plan[self.cursor].clone();
        self.cursor += 1;

        if let Some(next) = self.plan.get(self.cursor) {
            return StepOutcome::Advanced {
                node_id,
                next: next.clone(),
            };
        }

        let summary = RunSummary {
            run_id: self.id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            plan: std::mem::take(&mut self.plan),
            responses: std::mem::take(&mut self.responses),
            skipped: std::mem::take(&mut self.skipped),
        };
        info!(
            run_id = %self.id,
            answered = summary.responses.len(),
            skipped = summary.skipped.len(),
            "run completed"
        );
        self.discard(RunState::Idle);
        StepOutcome::Completed(summary)
    }

    fn discard(&mut self, state: RunState) {
        self.plan.clear();
        self.cursor = 0;
        self.responses.clear();
        self.skipped.clear();
        self.last_error = None;
        self.state = state;
    }
}

// ---------------------------------------------------------------------------
// ScenarioExecutor
// ---------------------------------------------------------------------------

/// Invokes plugins for plugin-backed steps.
///
/// Holds the plugin registry and configuration; all run state lives in
/// [`ScenarioRun`], so one executor can serve many independent runs.
#[derive(Debug, Clone)]
pub struct ScenarioExecutor {
    registry: Arc<PluginRegistry>,
    config: ExecutorConfig,
}

impl ScenarioExecutor {
    /// Create a new executor.
    pub fn new(registry: Arc<PluginRegistry>, config: ExecutorConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Create a run and start it on `graph`.
    pub fn start(&self, graph: &Graph) -> Result<ScenarioRun, EngineError> {
        let mut run = ScenarioRun::new();
        run.start(graph)?;
        Ok(run)
    }

    /// Invoke the current node's plugin and record its result.
    ///
    /// Plugin failures are returned as [`StepOutcome::PluginFailed`], not as
    /// errors: the run stays on the same node.
    ///
    /// # Errors
    /// - [`EngineError::NoActiveRun`] if the run isn't `Running`.
    /// - [`EngineError::NoPluginRef`] if the current node has no plugin.
    #[instrument(skip_all, fields(run_id = %run.id()))]
    pub async fn run_plugin(
        &self,
        run: &mut ScenarioRun,
        graph: &Graph,
        context: &mut ContextStore,
    ) -> Result<StepOutcome, EngineError> {
        run.ensure_running()?;
        let node = run.current_node(graph)?;
        let plugin_ref = node
            .plugin_ref
            .as_ref()
            .ok_or_else(|| EngineError::NoPluginRef(node.id().to_owned()))?;

        let params = if self.config.interpolate_plugin_params {
            interpolate_value(&plugin_ref.config, &run.resolver(context))
        } else {
            plugin_ref.config.clone()
        };

        let token = run.cancel_token();
        let result = self
            .invoke_with_retry(&plugin_ref.plugin_id, node.id(), &params, &token)
            .await;

        if token.is_cancelled() {
            info!(node_id = %node.id(), "plugin result discarded: run was cancelled");
            run.observe_cancellation();
            return Ok(StepOutcome::Discarded {
                node_id: node.id().to_owned(),
            });
        }

        match result {
            Ok(value) => {
                info!("node '{}' produced a result via plugin '{}'", node.id(), plugin_ref.plugin_id);
                Ok(run.record(node, value, context))
            }
            Err(error) => {
                warn!("node '{}' plugin '{}' failed: {}", node.id(), plugin_ref.plugin_id, error);
                run.last_error = Some(error.to_string());
                Ok(StepOutcome::PluginFailed {
                    node_id: node.id().to_owned(),
                    error,
                })
            }
        }
    }

    /// Run consecutive plugin-backed steps until a node needs a manual
    /// answer, a plugin fails, the run is cancelled, or the plan completes.
    pub async fn drive(
        &self,
        run: &mut ScenarioRun,
        graph: &Graph,
        context: &mut ContextStore,
    ) -> Result<StepOutcome, EngineError> {
        loop {
            run.ensure_running()?;
            let node = run.current_node(graph)?;
            if node.plugin_ref.is_none() {
                return Ok(StepOutcome::AwaitingInput {
                    node_id: node.id().to_owned(),
                });
            }
            match self.run_plugin(run, graph, context).await? {
                StepOutcome::Advanced { .. } => continue,
                other => return Ok(other),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal: invoke a plugin with retry logic.
    // -----------------------------------------------------------------------

    async fn invoke_with_retry(
        &self,
        plugin_id: &str,
        node_id: &str,
        params: &Value,
        token: &CancellationToken,
    ) -> Result<Value, PluginError> {
        let mut attempts = 0u32;

        loop {
            match self.registry.execute(plugin_id, node_id, params).await {
                Ok(output) => return Ok(output),

                Err(PluginError::Retryable(msg)) => {
                    attempts += 1;
                    if attempts > self.config.max_retries {
                        return Err(PluginError::Retryable(msg));
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, attempts);

                    warn!(
                        "node '{}' retryable plugin error (attempt {}/{}), retrying in {:?}: {}",
                        node_id, attempts, self.config.max_retries, delay, msg
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = token.cancelled() => return Err(PluginError::Retryable(msg)),
                    }
                }

                Err(other) => return Err(other),
            }
        }
    }
}

/// `base * 2^(attempt - 1)`, saturating instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}
