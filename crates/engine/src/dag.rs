//! Graph traversal: execution planning and structural checks.
//!
//! Planning never fails: the walk is guarded by a visited set, so a cycle
//! introduced while editing can't hang or duplicate steps. Cycle detection is
//! a separate check the caller may run to warn the author.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::context::ContextStore;
use crate::graph::Graph;
use crate::template::referenced_bindings;
use crate::EngineError;

/// Compute the execution plan.
///
/// Entry nodes (no incoming edge, or the first node when every node has one)
/// are walked in node insertion order. Each walk is a depth-first pre-order
/// traversal following outgoing edges in edge insertion order. A node reached
/// again, from any walk, is skipped.
pub fn execution_plan(graph: &Graph) -> Vec<String> {
    let mut entries = graph.entry_nodes();
    if entries.is_empty() {
        entries.extend(graph.node_ids().next());
    }

    let mut visited: HashSet<&str> = HashSet::with_capacity(graph.len());
    let mut plan: Vec<String> = Vec::with_capacity(graph.len());
    let mut stack: Vec<&str> = Vec::new();

    for entry in entries {
        stack.push(entry);
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            plan.push(id.to_owned());

            // Reverse so the first outgoing edge is popped first.
            let successors: Vec<&str> = graph.successors(id).collect();
            stack.extend(
                successors
                    .into_iter()
                    .rev()
                    .filter(|next| !visited.contains(next)),
            );
        }
    }

    plan
}

/// Return a node that lies on a cycle, if any.
///
/// Runs Kahn's algorithm; nodes left with a positive in-degree are on (or
/// downstream of) a cycle. The first such node in insertion order that
/// actually lies on a cycle is reported.
pub fn find_cycle(graph: &Graph) -> Option<String> {
    let mut in_degree: HashMap<&str, usize> = graph.node_ids().map(|id| (id, 0)).collect();
    for edge in graph.edges() {
        *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = graph
        .node_ids()
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    while let Some(id) = queue.pop_front() {
        for next in graph.successors(id) {
            if let Some(deg) = in_degree.get_mut(next) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    let remaining: HashSet<&str> = in_degree
        .into_iter()
        .filter(|(_, d)| *d > 0)
        .map(|(id, _)| id)
        .collect();

    graph
        .node_ids()
        .filter(|id| remaining.contains(id))
        .find(|id| reaches(graph, id, id, &remaining))
        .map(str::to_owned)
}

/// Whether `target` is reachable from `from` through at least one edge,
/// staying inside `within`.
fn reaches(graph: &Graph, from: &str, target: &str, within: &HashSet<&str>) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = graph.successors(from).collect();
    while let Some(id) = stack.pop() {
        if id == target {
            return true;
        }
        if within.contains(id) && seen.insert(id) {
            stack.extend(graph.successors(id));
        }
    }
    false
}

/// Structural validation for authoring tools.
///
/// # Errors
/// - [`EngineError::CycleDetected`] if the graph contains a cycle.
pub fn validate_graph(graph: &Graph) -> Result<(), EngineError> {
    match find_cycle(graph) {
        Some(id) => Err(EngineError::CycleDetected(id)),
        None => Ok(()),
    }
}

/// A `{{binding}}` no node, namespace, or context key can satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub node_id: String,
    pub binding: String,
}

/// List bindings that nothing in the scenario can ever resolve: not a node
/// id, not a namespace prefix of a node id, not a context key already
/// present, and not a key some node binds its result to.
pub fn unresolved_references(graph: &Graph, context: &ContextStore) -> Vec<UnresolvedReference> {
    let mut known: HashSet<&str> = HashSet::new();
    for node in graph.nodes() {
        let id = node.id();
        known.insert(id);
        for (i, _) in id.match_indices('.') {
            known.insert(&id[..i]);
        }
        if let Some(binding) = &node.context_binding {
            known.insert(binding.key.as_str());
        }
    }

    graph
        .nodes()
        .flat_map(|node| {
            referenced_bindings(&node.content)
                .into_iter()
                .filter(|b| !known.contains(b.as_str()) && !context.contains_key(b))
                .map(|binding| UnresolvedReference {
                    node_id: node.id().to_owned(),
                    binding,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}
