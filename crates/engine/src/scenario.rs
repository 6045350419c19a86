//! Scenarios and their persisted document shape.
//!
//! A [`Scenario`] is a graph plus the responses captured by its most recent
//! completed run. Import is tolerant: each node and edge is validated on its
//! own, rejected items are collected as [`ImportIssue`]s, and the rest of the
//! document still loads.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::graph::Graph;
use crate::models::{Edge, Node};
use crate::template::render_value;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Import issues
// ---------------------------------------------------------------------------

/// One rejected item from a batch import.
#[derive(Debug)]
pub struct ImportIssue {
    /// Where in the document the item sat, e.g. `nodes["a"]` or `edges[3]`.
    pub location: String,
    pub error: EngineError,
}

impl fmt::Display for ImportIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.error)
    }
}

/// Build a graph from loosely-typed node and edge values, skipping (and
/// recording) anything invalid. `nodes` pairs an optional map key, used as
/// the id when the node omits one, with the node value.
pub(crate) fn load_graph<I>(nodes: I, edges: Vec<Value>, issues: &mut Vec<ImportIssue>) -> Graph
where
    I: IntoIterator<Item = (String, Option<String>, Value)>,
{
    let mut graph = Graph::new();

    for (location, key, mut raw) in nodes {
        if let (Some(key), Value::Object(obj)) = (key, &mut raw) {
            obj.entry("id").or_insert(Value::String(key));
        }
        let result = serde_json::from_value::<Node>(raw)
            .map_err(|e| EngineError::invalid_node(None, e.to_string()))
            .and_then(|node| graph.add_node(node));
        if let Err(error) = result {
            warn!(%location, %error, "rejected node during import");
            issues.push(ImportIssue { location, error });
        }
    }

    for (i, raw) in edges.into_iter().enumerate() {
        let location = format!("edges[{i}]");
        let result = serde_json::from_value::<Edge>(raw)
            .map_err(EngineError::from)
            .and_then(|edge| graph.add_edge(&edge.source, &edge.target));
        if let Err(error) = result {
            warn!(%location, %error, "rejected edge during import");
            issues.push(ImportIssue { location, error });
        }
    }

    graph
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Export shape: `{ nodes, edges, categories, nodeResponses }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDocument {
    pub nodes: IndexMap<String, Node>,
    pub edges: Vec<Edge>,
    pub categories: Vec<String>,
    pub node_responses: IndexMap<String, String>,
}

/// Import shape. Every field is optional and every item is kept raw until it
/// is validated individually.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScenarioDocument {
    #[serde(default)]
    nodes: IndexMap<String, Value>,
    #[serde(default)]
    edges: Vec<Value>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    node_responses: IndexMap<String, Value>,
}

/// Result of a tolerant import.
#[derive(Debug)]
pub struct ScenarioImport {
    pub scenario: Scenario,
    pub issues: Vec<ImportIssue>,
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scenario {
    graph: Graph,
    responses: IndexMap<String, String>,
}

impl Scenario {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_graph(graph: Graph) -> Self {
        Self {
            graph,
            responses: IndexMap::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Remove a node, its edges, and its recorded response.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        self.responses.shift_remove(id);
        self.graph.remove_node(id)
    }

    /// Responses from the most recent completed run.
    pub fn responses(&self) -> &IndexMap<String, String> {
        &self.responses
    }

    /// Replace the recorded responses. Entries for unknown nodes are dropped.
    pub fn set_responses(&mut self, responses: IndexMap<String, String>) {
        self.responses = responses
            .into_iter()
            .filter(|(id, _)| self.graph.contains_node(id))
            .collect();
    }

    pub fn to_document(&self) -> ScenarioDocument {
        ScenarioDocument {
            nodes: self
                .graph
                .nodes()
                .map(|n| (n.id().to_owned(), n.clone()))
                .collect(),
            edges: self.graph.edges().to_vec(),
            categories: self.graph.categories().map(str::to_owned).collect(),
            node_responses: self
                .responses
                .iter()
                .filter(|(id, _)| self.graph.contains_node(id))
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
        }
    }

    pub fn to_json_string(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Import a scenario document.
    ///
    /// # Errors
    /// [`EngineError::Document`] only when the value isn't a document at all
    /// (e.g. not an object, or a top-level field of the wrong shape).
    pub fn import(value: Value) -> Result<ScenarioImport, EngineError> {
        let raw: RawScenarioDocument = serde_json::from_value(value)?;
        let mut issues = Vec::new();

        let nodes = raw
            .nodes
            .into_iter()
            .map(|(key, node)| (format!("nodes[{key:?}]"), Some(key), node));
        let mut graph = load_graph(nodes, raw.edges, &mut issues);
        for category in raw.categories {
            graph.add_category(category);
        }

        let mut scenario = Scenario::from_graph(graph);
        scenario.set_responses(
            raw.node_responses
                .into_iter()
                .map(|(id, v)| (id, render_value(&v)))
                .collect(),
        );

        info!(
            nodes = scenario.graph.len(),
            edges = scenario.graph.edges().len(),
            rejected = issues.len(),
            "scenario imported"
        );
        Ok(ScenarioImport { scenario, issues })
    }

    pub fn from_json_str(text: &str) -> Result<ScenarioImport, EngineError> {
        Self::import(serde_json::from_str(text)?)
    }
}
