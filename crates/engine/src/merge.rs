//! Templates and mounting them into a host graph.
//!
//! A template is a standalone subgraph with plain ids. Mounting copies it into
//! a host under `"{namespace}.{id}"` ids, remaps its edges, and hangs its
//! entry nodes off a mount node. Mounting only ever adds to the host.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::graph::Graph;
use crate::models::{Edge, Node};
use crate::scenario::{load_graph, ImportIssue};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// A reusable node/edge subgraph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub name: String,
    pub description: String,
    graph: Graph,
}

/// File format: `{ name, description, nodes: Node[], edges: Edge[] }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateDocument {
    pub name: String,
    pub description: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTemplateDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    nodes: Vec<Value>,
    #[serde(default)]
    edges: Vec<Value>,
}

/// Result of a tolerant template import.
#[derive(Debug)]
pub struct TemplateImport {
    pub template: Template,
    pub issues: Vec<ImportIssue>,
}

impl Template {
    pub fn new(name: impl Into<String>, description: impl Into<String>, graph: Graph) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            graph,
        }
    }

    /// Export a whole graph as a template.
    pub fn from_graph(name: impl Into<String>, description: impl Into<String>, graph: &Graph) -> Self {
        Self::new(name, description, graph.clone())
    }

    /// Copy the `namespace.*` subgraph of `graph` out as a template, stripping
    /// the prefix. Edges leaving or entering the namespace are not copied.
    ///
    /// # Errors
    /// [`EngineError::InvalidTemplate`] if no node lives under `namespace`.
    pub fn extract(graph: &Graph, namespace: &str) -> Result<Self, EngineError> {
        validate_namespace(namespace)?;
        let prefix = format!("{namespace}.");

        let mut extracted = Graph::new();
        for node in graph.nodes() {
            if let Some(plain) = node.id().strip_prefix(&prefix) {
                extracted.add_node(node.clone_with_id(plain.to_owned()))?;
            }
        }
        for edge in graph.edges() {
            if let (Some(s), Some(t)) = (
                edge.source.strip_prefix(&prefix),
                edge.target.strip_prefix(&prefix),
            ) {
                extracted.add_edge(s, t)?;
            }
        }
        if extracted.is_empty() {
            return Err(EngineError::InvalidTemplate(format!(
                "no nodes under namespace '{namespace}'"
            )));
        }
        Ok(Self::new(namespace, String::new(), extracted))
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn to_document(&self) -> TemplateDocument {
        TemplateDocument {
            name: self.name.clone(),
            description: self.description.clone(),
            nodes: self.graph.nodes().cloned().collect(),
            edges: self.graph.edges().to_vec(),
        }
    }

    pub fn to_json_string(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Import a template document, rejecting invalid nodes and edges
    /// individually.
    pub fn import(value: Value) -> Result<TemplateImport, EngineError> {
        let raw: RawTemplateDocument = serde_json::from_value(value)?;
        let mut issues = Vec::new();
        let nodes = raw
            .nodes
            .into_iter()
            .enumerate()
            .map(|(i, node)| (format!("nodes[{i}]"), None, node));
        let graph = load_graph(nodes, raw.edges, &mut issues);
        Ok(TemplateImport {
            template: Self::new(raw.name, raw.description, graph),
            issues,
        })
    }

    pub fn from_json_str(text: &str) -> Result<TemplateImport, EngineError> {
        Self::import(serde_json::from_str(text)?)
    }
}

// ---------------------------------------------------------------------------
// Mount
// ---------------------------------------------------------------------------

/// What a mount added to the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MountReport {
    /// Template id → host id.
    pub id_map: IndexMap<String, String>,
    /// Edges from the mount node into the imported subgraph.
    pub attach_edges: Vec<Edge>,
    /// Template edges, remapped.
    pub internal_edges: Vec<Edge>,
}

fn validate_namespace(namespace: &str) -> Result<(), EngineError> {
    let bad = namespace.trim().is_empty()
        || namespace.starts_with('.')
        || namespace.ends_with('.')
        || namespace.contains(['{', '}'])
        || namespace.chars().any(char::is_whitespace);
    if bad {
        return Err(EngineError::InvalidNamespace(namespace.to_owned()));
    }
    Ok(())
}

/// Mount `template` into `host` below `mount_node_id` under `namespace`.
///
/// Every precondition is checked before `host` is touched, so on error the
/// host is unchanged.
///
/// # Errors
/// - [`EngineError::InvalidNamespace`] for an empty or malformed namespace.
/// - [`EngineError::UnknownNode`] if the mount node isn't in `host`.
/// - [`EngineError::NamespaceCollision`] if a synthesized id already exists.
#[instrument(skip(host, template), fields(template = %template.name))]
pub fn mount(
    host: &mut Graph,
    template: &Template,
    mount_node_id: &str,
    namespace: &str,
) -> Result<MountReport, EngineError> {
    validate_namespace(namespace)?;
    if !host.contains_node(mount_node_id) {
        return Err(EngineError::UnknownNode(mount_node_id.to_owned()));
    }

    // ------------------------------------------------------------------
    // 1. Remap table; refuse before mutating if anything collides.
    // ------------------------------------------------------------------
    let id_map: IndexMap<String, String> = template
        .graph
        .node_ids()
        .map(|id| (id.to_owned(), format!("{namespace}.{id}")))
        .collect();

    if let Some(taken) = id_map.values().find(|new_id| host.contains_node(new_id)) {
        return Err(EngineError::NamespaceCollision {
            namespace: namespace.to_owned(),
            node_id: taken.clone(),
        });
    }

    // ------------------------------------------------------------------
    // 2. Copy nodes. Context bindings keep their keys.
    // ------------------------------------------------------------------
    for node in template.graph.nodes() {
        host.add_node(node.clone_with_id(id_map[node.id()].clone()))?;
    }

    // ------------------------------------------------------------------
    // 3. Remapped internal edges.
    // ------------------------------------------------------------------
    let mut report = MountReport {
        id_map,
        ..MountReport::default()
    };
    for edge in template.graph.edges() {
        let remapped = Edge::new(
            report.id_map[edge.source.as_str()].clone(),
            report.id_map[edge.target.as_str()].clone(),
        );
        host.add_edge(&remapped.source, &remapped.target)?;
        report.internal_edges.push(remapped);
    }

    // ------------------------------------------------------------------
    // 4. Attach entry nodes (or the first node) to the mount point.
    // ------------------------------------------------------------------
    let mut entries = template.graph.entry_nodes();
    if entries.is_empty() {
        entries.extend(template.graph.node_ids().next());
    }
    for entry in entries {
        let target = report.id_map[entry].clone();
        host.add_edge(mount_node_id, &target)?;
        report.attach_edges.push(Edge::new(mount_node_id, target));
    }

    info!(
        namespace,
        mount_node_id,
        nodes = report.id_map.len(),
        attach_edges = report.attach_edges.len(),
        "template mounted"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextBinding;
    use serde_json::json;

    fn two_node_template() -> Template {
        let mut graph = Graph::new();
        graph
            .add_node(Node::new("a", "Question").with_binding(ContextBinding::key("answers")))
            .unwrap();
        graph.add_node(Node::new("b", "Follow up on {{a}}")).unwrap();
        graph.add_edge("a", "b").unwrap();
        Template::new("qa", "question and follow-up", graph)
    }

    fn host() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(Node::new("root", "Start")).unwrap();
        graph.add_node(Node::new("other", "Elsewhere")).unwrap();
        graph.add_edge("root", "other").unwrap();
        graph
    }

    #[test]
    fn mount_remaps_ids_and_attaches_entries() {
        let mut host = host();
        let report = mount(&mut host, &two_node_template(), "root", "sec1").unwrap();

        assert!(host.has_edge("root", "sec1.a"));
        assert!(host.has_edge("sec1.a", "sec1.b"));
        assert_eq!(report.attach_edges, vec![Edge::new("root", "sec1.a")]);
        assert_eq!(report.internal_edges, vec![Edge::new("sec1.a", "sec1.b")]);
        assert_eq!(report.id_map["b"], "sec1.b");
    }

    #[test]
    fn mount_is_purely_additive() {
        let mut host = host();
        let before = host.clone();
        mount(&mut host, &two_node_template(), "root", "sec1").unwrap();

        for node in before.nodes() {
            assert_eq!(host.node(node.id()), Some(node));
        }
        assert_eq!(&host.edges()[..before.edges().len()], before.edges());
        assert_eq!(host.len(), before.len() + 2);
        // one internal edge + one attach edge
        assert_eq!(host.edges().len(), before.edges().len() + 2);
        for id in host.node_ids().filter(|id| before.node(id).is_none()) {
            assert!(id.starts_with("sec1."));
        }
    }

    #[test]
    fn bindings_and_content_are_not_namespaced() {
        let mut host = host();
        mount(&mut host, &two_node_template(), "root", "ns").unwrap();
        let a = host.node("ns.a").unwrap();
        assert_eq!(a.context_binding(), Some(&ContextBinding::key("answers")));
        assert_eq!(host.node("ns.b").unwrap().content, "Follow up on {{a}}");
    }

    #[test]
    fn mounting_twice_under_different_namespaces_is_safe() {
        let mut host = host();
        let template = two_node_template();
        mount(&mut host, &template, "root", "one").unwrap();
        mount(&mut host, &template, "one.b", "two").unwrap();
        assert_eq!(host.len(), 6);
        assert!(host.has_edge("one.b", "two.a"));
    }

    #[test]
    fn reusing_a_namespace_fails_without_touching_host() {
        let mut host = host();
        let template = two_node_template();
        mount(&mut host, &template, "root", "sec1").unwrap();
        let snapshot = host.clone();

        let err = mount(&mut host, &template, "other", "sec1").unwrap_err();
        assert!(matches!(err, EngineError::NamespaceCollision { .. }));
        assert_eq!(host, snapshot);
    }

    #[test]
    fn unknown_mount_node_and_bad_namespace_are_rejected() {
        let mut host = host();
        let template = two_node_template();
        assert!(matches!(
            mount(&mut host, &template, "ghost", "ns"),
            Err(EngineError::UnknownNode(_))
        ));
        for ns in ["", " ", "a b", "{{x}}", ".lead", "trail."] {
            assert!(matches!(
                mount(&mut host, &template, "root", ns),
                Err(EngineError::InvalidNamespace(_))
            ));
        }
        assert_eq!(host.len(), 2);
    }

    #[test]
    fn template_with_several_entries_attaches_each() {
        let mut graph = Graph::new();
        for id in ["x", "y", "z"] {
            graph.add_node(Node::new(id, "")).unwrap();
        }
        graph.add_edge("x", "z").unwrap();
        graph.add_edge("y", "z").unwrap();
        let template = Template::new("multi", "", graph);

        let mut host = host();
        let report = mount(&mut host, &template, "root", "m").unwrap();
        assert_eq!(
            report.attach_edges,
            vec![Edge::new("root", "m.x"), Edge::new("root", "m.y")]
        );
    }

    #[test]
    fn cyclic_template_attaches_first_node() {
        let mut graph = Graph::new();
        graph.add_node(Node::new("p", "")).unwrap();
        graph.add_node(Node::new("q", "")).unwrap();
        graph.add_edge("p", "q").unwrap();
        graph.add_edge("q", "p").unwrap();
        let template = Template::new("loop", "", graph);

        let mut host = host();
        let report = mount(&mut host, &template, "root", "c").unwrap();
        assert_eq!(report.attach_edges, vec![Edge::new("root", "c.p")]);
    }

    #[test]
    fn extract_strips_the_namespace() {
        let mut host = host();
        let template = two_node_template();
        mount(&mut host, &template, "root", "sec1").unwrap();

        let extracted = Template::extract(&host, "sec1").unwrap();
        assert_eq!(extracted.graph(), template.graph());
        assert!(matches!(
            Template::extract(&host, "nope"),
            Err(EngineError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn template_file_uses_plain_ids() {
        let doc = serde_json::to_value(two_node_template().to_document()).unwrap();
        assert_eq!(doc["nodes"][0]["id"], json!("a"));
        assert_eq!(doc["edges"], json!([{ "source": "a", "target": "b" }]));

        let imported = Template::import(doc).unwrap();
        assert!(imported.issues.is_empty());
        assert_eq!(imported.template, two_node_template());
    }

    #[test]
    fn template_import_tolerates_bad_items() {
        let imported = Template::import(json!({
            "name": "t",
            "nodes": [ { "id": "a", "label": "A" }, { "label": "no id" } ],
            "edges": [ { "source": "a", "target": "missing" } ]
        }))
        .unwrap();
        assert_eq!(imported.template.graph().len(), 1);
        assert_eq!(imported.issues.len(), 2);
        assert_eq!(imported.template.description, "");
    }
}
