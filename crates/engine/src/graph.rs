//! The scenario graph: insertion-ordered nodes, ordered edges, and the set of
//! known categories.
//!
//! Insertion order is significant: it drives entry-node order and the order in
//! which outgoing edges are followed when planning a run.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::models::{ContextBinding, Edge, Node, DEFAULT_CATEGORY};
use crate::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    nodes: IndexMap<String, Node>,
    edges: Vec<Edge>,
    categories: IndexSet<String>,
}

impl Default for Graph {
    fn default() -> Self {
        let mut categories = IndexSet::new();
        categories.insert(DEFAULT_CATEGORY.to_owned());
        Self {
            nodes: IndexMap::new(),
            edges: Vec::new(),
            categories,
        }
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Validate and insert a node. Its category joins the category set.
    ///
    /// # Errors
    /// - [`EngineError::InvalidNode`] if validation fails.
    /// - [`EngineError::DuplicateNodeId`] if the id is taken.
    pub fn add_node(&mut self, mut node: Node) -> Result<(), EngineError> {
        node.validate()?;
        if self.nodes.contains_key(node.id()) {
            return Err(EngineError::DuplicateNodeId(node.id().to_owned()));
        }
        self.categories.insert(node.category.clone());
        debug!(node_id = %node.id(), category = %node.category, "node added");
        self.nodes.insert(node.id().to_owned(), node);
        Ok(())
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let node = self.nodes.shift_remove(id)?;
        let before = self.edges.len();
        self.edges.retain(|e| e.source != id && e.target != id);
        debug!(
            node_id = %id,
            edges_removed = before - self.edges.len(),
            "node removed"
        );
        Some(node)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Mutable access for editor actions on content, label, plugin and
    /// position. Id, category and binding go through dedicated setters.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Replace a node's context binding.
    ///
    /// # Errors
    /// - [`EngineError::UnknownNode`] if the node is missing.
    /// - [`EngineError::InvalidNode`] if the binding key is blank.
    pub fn set_binding(
        &mut self,
        id: &str,
        binding: Option<ContextBinding>,
    ) -> Result<(), EngineError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_owned()))?;
        if let Some(binding) = &binding {
            binding.check(id)?;
        }
        node.context_binding = binding;
        Ok(())
    }

    /// Move a node to another category, registering the category if new.
    pub fn set_category(&mut self, id: &str, category: &str) -> Result<(), EngineError> {
        let category = if category.trim().is_empty() {
            DEFAULT_CATEGORY
        } else {
            category
        };
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_owned()))?;
        node.category = category.to_owned();
        self.categories.insert(category.to_owned());
        Ok(())
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Insert `source → target`. Returns `false` if the edge already existed.
    ///
    /// # Errors
    /// - [`EngineError::SelfLoop`] if `source == target`.
    /// - [`EngineError::UnknownNodeReference`] if either endpoint is missing.
    pub fn add_edge(&mut self, source: &str, target: &str) -> Result<bool, EngineError> {
        if source == target {
            return Err(EngineError::SelfLoop(source.to_owned()));
        }
        if !self.nodes.contains_key(source) {
            return Err(EngineError::UnknownNodeReference {
                node_id: source.to_owned(),
                side: "source",
            });
        }
        if !self.nodes.contains_key(target) {
            return Err(EngineError::UnknownNodeReference {
                node_id: target.to_owned(),
                side: "target",
            });
        }
        if self.has_edge(source, target) {
            return Ok(false);
        }
        self.edges.push(Edge::new(source, target));
        Ok(true)
    }

    pub fn remove_edge(&mut self, source: &str, target: &str) -> bool {
        let before = self.edges.len();
        self.edges
            .retain(|e| !(e.source == source && e.target == target));
        self.edges.len() != before
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == source && e.target == target)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Targets of `id`'s outgoing edges, in edge insertion order.
    pub fn successors<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source == id)
            .map(|e| e.target.as_str())
    }

    /// Sources of `id`'s incoming edges, in edge insertion order.
    pub fn predecessors<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.target == id)
            .map(|e| e.source.as_str())
    }

    /// Nodes with no incoming edge, in node insertion order.
    pub fn entry_nodes(&self) -> Vec<&str> {
        self.nodes
            .keys()
            .filter(|id| !self.edges.iter().any(|e| &e.target == *id))
            .map(String::as_str)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Categories
    // -----------------------------------------------------------------------

    /// Known categories in first-seen order. Always includes the default.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(String::as_str)
    }

    pub fn add_category(&mut self, category: impl Into<String>) -> bool {
        let category = category.into();
        if category.trim().is_empty() {
            return false;
        }
        self.categories.insert(category)
    }
}
