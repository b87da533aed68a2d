use std::collections::{hash_map::Entry, HashMap};

use indexmap::{IndexMap, IndexSet};
use serde_json::Value as JsonValue;

use crate::{
    document::{DocPath, DocumentNode, ReferenceObject},
    errors::LoadError,
    types::RegistryKey,
};

/// Index of a [GraphNode], in order of discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(pub usize);

/// A field value which is not instantiated yet
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Data(JsonValue),
    /// Named reference, before resolution
    Named { name: String, path: DocPath },
    /// The constructor registered for a key, not an instance
    Type { key: RegistryKey, path: DocPath },
    /// A built node: either a nested reference object or a resolved named reference
    Node(NodeId),
    Array(Vec<Slot>),
    Object(IndexMap<String, Slot>),
}

/// One reference object waiting to be built
#[derive(Debug)]
pub(crate) struct GraphNode {
    pub id: NodeId,
    pub key: RegistryKey,
    pub instance: Option<String>,
    pub path: DocPath,
    pub fields: IndexMap<String, Slot>,
    /// Nodes which must be built before this one, in order of appearance
    pub dependencies: Vec<NodeId>,
}
impl GraphNode {
    /// Name used in diagnostics
    pub fn label(&self) -> String {
        match &self.instance {
            Some(name) => name.clone(),
            None => format!("{} at {}", self.key, self.path),
        }
    }
}

/// Graph of all reference objects of a document
///
/// Built in three steps:
/// 1. [DependencyGraph::build] creates one node per reference object and collects instance names
/// 2. [DependencyGraph::resolve] links named references and nested objects as dependencies
/// 3. [DependencyGraph::order] returns the build order, failing on cycles
#[derive(Debug)]
pub(crate) struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    /// Declared instance names
    pub names: HashMap<String, NodeId>,
    /// Document structure outside of reference objects
    pub root: Slot,
    /// Reference objects outside of any other reference object, in document order
    pub roots: Vec<NodeId>,
}

impl DependencyGraph {
    pub fn build(document: DocumentNode) -> Result<Self, LoadError> {
        let mut graph = Self {
            nodes: Vec::new(),
            names: HashMap::new(),
            root: Slot::Data(JsonValue::Null),
            roots: Vec::new(),
        };

        graph.root = graph.add_tree(document, &DocPath::root(), true)?;

        tracing::debug!(
            "Built dependency graph with {} nodes, {} of them named",
            graph.nodes.len(),
            graph.names.len()
        );
        Ok(graph)
    }

    /// Walks a document tree depth first, turning every reference object into a node
    fn add_tree(
        &mut self,
        node: DocumentNode,
        path: &DocPath,
        top_level: bool,
    ) -> Result<Slot, LoadError> {
        Ok(match node {
            DocumentNode::Scalar(value) => Slot::Data(value),
            DocumentNode::NamedReference(name) => Slot::Named {
                name,
                path: path.clone(),
            },
            DocumentNode::TypeReference(key) => Slot::Type {
                key,
                path: path.clone(),
            },
            DocumentNode::Array(items) => Slot::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| self.add_tree(item, &path.join(index), top_level))
                    .collect::<Result<_, _>>()?,
            ),
            DocumentNode::Object(fields) => Slot::Object(self.add_fields(fields, path, top_level)?),
            DocumentNode::ReferenceObject(reference) => {
                let id = self.add_node(reference, path)?;
                if top_level {
                    self.roots.push(id);
                }
                Slot::Node(id)
            }
        })
    }

    fn add_fields(
        &mut self,
        fields: IndexMap<String, DocumentNode>,
        path: &DocPath,
        top_level: bool,
    ) -> Result<IndexMap<String, Slot>, LoadError> {
        fields
            .into_iter()
            .map(|(name, node)| {
                let slot = self.add_tree(node, &path.join(&name), top_level)?;
                Ok((name, slot))
            })
            .collect()
    }

    fn add_node(&mut self, reference: ReferenceObject, path: &DocPath) -> Result<NodeId, LoadError> {
        let ReferenceObject {
            key,
            instance,
            fields,
        } = reference;

        // Ids are handed out before descending, so they follow document order
        let id = NodeId(self.nodes.len());

        if let Some(name) = &instance {
            match self.names.entry(name.clone()) {
                Entry::Occupied(existing) => {
                    return Err(LoadError::DuplicateSingletonName {
                        name: name.clone(),
                        first: self.nodes[existing.get().0].path.clone(),
                        second: path.clone(),
                    });
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(id);
                }
            }
        }

        self.nodes.push(GraphNode {
            id,
            key,
            instance,
            path: path.clone(),
            fields: IndexMap::new(),
            dependencies: Vec::new(),
        });

        let fields = self.add_fields(fields, path, false)?;
        self.nodes[id.0].fields = fields;

        Ok(id)
    }

    /// Links every named reference to its declared node
    ///
    /// Named references inside reference objects become dependencies of that object,
    /// references in the remaining document are only checked.
    pub fn resolve(&mut self) -> Result<(), LoadError> {
        let names = &self.names;

        for node in self.nodes.iter_mut() {
            // Keeps the first occurrence of every dependency
            let mut dependencies = IndexSet::new();
            for slot in node.fields.values_mut() {
                resolve_slot(names, slot, &mut dependencies)?;
            }

            tracing::trace!(
                "'{}' depends on {} other nodes",
                node.label(),
                dependencies.len()
            );
            node.dependencies = dependencies.into_iter().collect();
        }

        resolve_slot(names, &mut self.root, &mut IndexSet::new())?;
        return Ok(());

        fn resolve_slot(
            names: &HashMap<String, NodeId>,
            slot: &mut Slot,
            dependencies: &mut IndexSet<NodeId>,
        ) -> Result<(), LoadError> {
            match slot {
                Slot::Data(_) | Slot::Type { .. } => {}
                // Nested reference objects are separate nodes, their fields are scanned by themselves
                Slot::Node(id) => {
                    dependencies.insert(*id);
                }
                Slot::Named { name, path } => {
                    let Some(id) = names.get(name.as_str()) else {
                        return Err(LoadError::UnresolvedReference {
                            name: name.clone(),
                            path: path.clone(),
                        });
                    };
                    dependencies.insert(*id);
                    *slot = Slot::Node(*id);
                }
                Slot::Array(items) => {
                    for item in items {
                        resolve_slot(names, item, dependencies)?;
                    }
                }
                Slot::Object(fields) => {
                    for field in fields.values_mut() {
                        resolve_slot(names, field, dependencies)?;
                    }
                }
            }
            Ok(())
        }
    }

    /// Returns all nodes ordered so every dependency comes before its dependents
    ///
    /// Nodes without a dependency relation keep their document order.
    /// Depth first post order with an explicit stack, chains of any length are fine.
    pub fn order(&self) -> Result<Vec<NodeId>, LoadError> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        // Nodes in progress, with the index of their next dependency to visit
        let mut chain: Vec<(NodeId, usize)> = Vec::new();

        for node in &self.nodes {
            if marks[node.id.0] != Mark::Unvisited {
                continue;
            }
            marks[node.id.0] = Mark::InProgress;
            chain.push((node.id, 0));

            while let Some((id, next)) = chain.last_mut() {
                let id = *id;
                let Some(dependency) = self.nodes[id.0].dependencies.get(*next).copied() else {
                    chain.pop();
                    marks[id.0] = Mark::Done;
                    order.push(id);
                    continue;
                };
                *next += 1;

                match marks[dependency.0] {
                    Mark::Done => {}
                    // Circular Dependency - chain holds the path from the first visit back to this node
                    Mark::InProgress => return Err(self.cycle(&chain, dependency)),
                    Mark::Unvisited => {
                        marks[dependency.0] = Mark::InProgress;
                        chain.push((dependency, 0));
                    }
                }
            }
        }

        Ok(order)
    }

    fn cycle(&self, chain: &[(NodeId, usize)], closing: NodeId) -> LoadError {
        let start = chain
            .iter()
            .position(|(id, _)| *id == closing)
            .unwrap_or(0);
        let mut path: Vec<String> = chain[start..]
            .iter()
            .map(|(id, _)| self.nodes[id.0].label())
            .collect();
        path.push(self.nodes[closing.0].label());
        LoadError::CyclicDependency { path }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value as JsonValue};

    use super::*;
    use crate::options::LoaderOptions;

    fn reference(schema: &str, instance: Option<&str>) -> JsonValue {
        let mut marker = json!({"registry": {"schema": schema, "version": "1.0.0"}});
        if let Some(instance) = instance {
            marker["instance"] = json!(instance);
        }
        json!({ "$reference": marker })
    }

    fn with_fields(mut reference: JsonValue, fields: JsonValue) -> JsonValue {
        for (name, value) in fields.as_object().unwrap() {
            reference[name] = value.clone();
        }
        reference
    }

    fn graph(document: JsonValue) -> Result<DependencyGraph, LoadError> {
        let document = DocumentNode::classify(document, &LoaderOptions::default())?;
        let mut graph = DependencyGraph::build(document)?;
        graph.resolve()?;
        Ok(graph)
    }

    fn labels(graph: &DependencyGraph, order: &[NodeId]) -> Vec<String> {
        order.iter().map(|id| graph.nodes[id.0].label()).collect()
    }

    #[test]
    fn dependencies_are_ordered_first() {
        let graph = graph(json!({
            "svc": with_fields(reference("user_service", Some("svc")), json!({"db": "$main_db"})),
            "db": with_fields(reference("database", Some("main_db")), json!({"port": 5432})),
        }))
        .unwrap();

        assert_eq!(graph.nodes[0].dependencies, vec![NodeId(1)]);
        assert_eq!(graph.roots, vec![NodeId(0), NodeId(1)]);
        let order = graph.order().unwrap();
        assert_eq!(labels(&graph, &order), vec!["main_db", "svc"]);
    }

    #[test]
    fn independent_nodes_keep_document_order() {
        let graph = graph(json!([
            reference("a", Some("first")),
            reference("b", None),
            reference("c", Some("third")),
        ]))
        .unwrap();

        let order = graph.order().unwrap();
        assert_eq!(order, vec![NodeId(0), NodeId(1), NodeId(2)]);
    }

    #[test]
    fn nested_reference_objects_are_dependencies() {
        let graph = graph(json!({
            "svc": with_fields(reference("user_service", None), json!({
                "cache": with_fields(reference("cache", Some("cache")), json!({"size": 10})),
                "backends": [reference("backend", None), "$cache"],
            })),
        }))
        .unwrap();

        // svc is discovered first but depends on everything nested in it
        assert_eq!(graph.nodes[0].dependencies, vec![NodeId(1), NodeId(2)]);
        assert_eq!(graph.roots, vec![NodeId(0)]);
        assert_eq!(graph.order().unwrap(), vec![NodeId(1), NodeId(2), NodeId(0)]);
    }

    #[test]
    fn duplicate_names_fail_regardless_of_order() {
        for document in [
            json!({"a": reference("x", Some("x")), "b": reference("y", Some("x"))}),
            json!({"b": reference("y", Some("x")), "a": reference("x", Some("x"))}),
            json!({"a": with_fields(reference("x", None), json!({"inner": reference("y", Some("x"))})), "b": reference("y", Some("x"))}),
        ] {
            match graph(document) {
                Err(LoadError::DuplicateSingletonName { name, first, second }) => {
                    assert_eq!(name, "x");
                    assert_ne!(first, second);
                }
                other => panic!("expected duplicate name error, got {other:?}"),
            }
        }
    }

    #[test]
    fn unresolved_references_fail() {
        let error = graph(json!({
            "svc": with_fields(reference("user_service", None), json!({"db": {"primary": "$missing_db"}})),
        }))
        .unwrap_err();

        match error {
            LoadError::UnresolvedReference { name, path } => {
                assert_eq!(name, "missing_db");
                assert_eq!(path.to_string(), "/svc/db/primary");
            }
            other => panic!("expected unresolved reference, got {other:?}"),
        }
    }

    #[test]
    fn root_references_are_checked_without_edges() {
        let built = graph(json!({
            "db": reference("database", Some("db")),
            "alias": "$db",
        }))
        .unwrap();
        assert!(built.nodes[0].dependencies.is_empty());
        assert_eq!(
            built.root,
            Slot::Object(IndexMap::from([
                ("db".to_string(), Slot::Node(NodeId(0))),
                ("alias".to_string(), Slot::Node(NodeId(0))),
            ]))
        );

        let error = graph(json!({"alias": "$nothing"})).unwrap_err();
        assert!(matches!(error, LoadError::UnresolvedReference { name, .. } if name == "nothing"));
    }

    #[test]
    fn cycles_report_their_path() {
        let graph = graph(json!({
            "a": with_fields(reference("a", Some("a")), json!({"dep": "$b"})),
            "b": with_fields(reference("b", Some("b")), json!({"dep": "$a"})),
        }))
        .unwrap();

        match graph.order() {
            Err(LoadError::CyclicDependency { path }) => assert_eq!(path, vec!["a", "b", "a"]),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_references_are_cycles() {
        let graph = graph(json!({
            "unrelated": reference("x", None),
            "a": with_fields(reference("a", Some("a")), json!({"me": ["$a"]})),
        }))
        .unwrap();

        match graph.order() {
            Err(LoadError::CyclicDependency { path }) => assert_eq!(path, vec!["a", "a"]),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn long_chains_are_ordered_without_recursion() {
        const LINKS: usize = 50_000;

        let mut document = serde_json::Map::new();
        for index in 0..LINKS {
            let mut link = reference("link", Some(format!("l{index}").as_str()));
            if index + 1 < LINKS {
                link["next"] = json!(format!("$l{}", index + 1));
            }
            document.insert(format!("link{index}"), link);
        }
        let graph = graph(JsonValue::Object(document)).unwrap();

        let order = graph.order().unwrap();
        assert_eq!(order.len(), LINKS);
        assert_eq!(order.first(), Some(&NodeId(LINKS - 1)));
        assert_eq!(order.last(), Some(&NodeId(0)));
    }

    #[test]
    fn long_cycles_report_their_path() {
        const LINKS: usize = 50_000;

        let mut document = serde_json::Map::new();
        for index in 0..LINKS {
            let mut link = reference("link", Some(format!("l{index}").as_str()));
            link["next"] = json!(format!("$l{}", (index + 1) % LINKS));
            document.insert(format!("link{index}"), link);
        }
        let graph = graph(JsonValue::Object(document)).unwrap();

        match graph.order() {
            Err(LoadError::CyclicDependency { path }) => {
                assert_eq!(path.len(), LINKS + 1);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn repeated_dependencies_are_kept_once() {
        let graph = graph(json!({
            "db": reference("database", Some("db")),
            "cache": reference("cache", Some("cache")),
            "svc": with_fields(reference("user_service", None), json!({
                "primary": "$db",
                "backends": ["$cache", "$db", {"again": "$cache"}],
            })),
        }))
        .unwrap();

        assert_eq!(graph.nodes[2].dependencies, vec![NodeId(0), NodeId(1)]);
    }

    #[test]
    fn type_references_are_not_dependencies() {
        let graph = graph(json!({
            "factory": with_fields(reference("factory", None), json!({
                "service_class": {"$type": {"registry": {"schema": "service", "version": "1.0.0"}}},
            })),
        }))
        .unwrap();

        assert!(graph.nodes[0].dependencies.is_empty());
        assert_eq!(
            graph.nodes[0].fields["service_class"],
            Slot::Type {
                key: RegistryKey::new("service", "1.0.0"),
                path: DocPath::root().join("factory").join("service_class"),
            }
        );
    }

    #[test]
    fn anonymous_nodes_are_labelled_by_key_and_path() {
        let graph = graph(json!({"svc": reference("user_service", None)})).unwrap();
        assert_eq!(graph.nodes[0].label(), "user_service@1.0.0 at /svc");
    }
}
