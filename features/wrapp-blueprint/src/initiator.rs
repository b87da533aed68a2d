use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    container::{InstancePool, PoolEntry},
    dependency_graph::{DependencyGraph, GraphNode, NodeId, Slot},
    document::DocPath,
    errors::LoadError,
    fields::{ArgumentError, Fields, Value},
    options::LoaderOptions,
    registry::{Capability, Registry},
    types::{DynError, Instance, RegistryKey},
};

/// Builds every node of a resolved [DependencyGraph] into an [InstancePool]
pub(crate) struct BlueprintInitiator<'r> {
    registry: &'r Registry,
    options: &'r LoaderOptions,

    /// Built instances by node - None = not built yet
    built: Vec<Option<Instance>>,
    /// Index of each node's entry in the pool
    entry_of: Vec<Option<usize>>,
    /// All produced instances, in construction order
    entries: Vec<PoolEntry>,
}

impl<'r> BlueprintInitiator<'r> {
    pub(crate) fn new(registry: &'r Registry, options: &'r LoaderOptions) -> Self {
        BlueprintInitiator {
            registry,
            options,
            built: Vec::new(),
            entry_of: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn initiate(mut self, graph: DependencyGraph) -> Result<InstancePool, LoadError> {
        let order = graph.order()?;

        let DependencyGraph {
            nodes, root, roots, ..
        } = graph;

        // Look up every constructor first, so a missing one fails before anything is built
        let capabilities = nodes
            .iter()
            .map(|node| self.capability_for(node))
            .collect::<Result<Vec<_>, _>>()?;
        for slot in nodes.iter().flat_map(|node| node.fields.values()) {
            self.check_types(slot)?;
        }
        self.check_types(&root)?;

        tracing::debug!(
            "Initiating {} instances from {} registered constructors",
            nodes.len(),
            self.registry.len()
        );

        self.built = vec![None; nodes.len()];
        self.entry_of = vec![None; nodes.len()];

        // Nodes are retired once built
        let mut nodes: Vec<Option<GraphNode>> = nodes.into_iter().map(Some).collect();

        for (built_count, id) in order.into_iter().enumerate() {
            let Some(node) = nodes[id.0].take() else {
                continue;
            };
            tracing::trace!(
                "Building '{}' [{built_count} of {} complete]",
                node.label(),
                self.built.len()
            );
            self.build_node(node, capabilities[id.0])?;
        }

        let root = self.rebuild(root)?;
        let roots = roots.into_iter().filter_map(|id| self.entry_of[id.0]).collect();

        tracing::debug!("All {} instances built", self.entries.len());
        Ok(InstancePool::new(self.entries, roots, root, &self.options.sigil))
    }

    fn capability_for(&self, node: &GraphNode) -> Result<&'r Capability, LoadError> {
        self.registry
            .lookup(&node.key)
            .ok_or_else(|| LoadError::RegistryMiss {
                key: node.key.clone(),
                instance: node.instance.clone(),
                path: node.path.clone(),
            })
    }

    fn capability_of(&self, key: &RegistryKey, path: &DocPath) -> Result<&'r Capability, LoadError> {
        self.registry
            .lookup(key)
            .ok_or_else(|| LoadError::RegistryMiss {
                key: key.clone(),
                instance: None,
                path: path.clone(),
            })
    }

    /// Fails on the first type reference without a registered constructor
    fn check_types(&self, slot: &Slot) -> Result<(), LoadError> {
        match slot {
            Slot::Type { key, path } => self.capability_of(key, path).map(|_| ()),
            Slot::Array(items) => items.iter().try_for_each(|item| self.check_types(item)),
            Slot::Object(fields) => fields.values().try_for_each(|field| self.check_types(field)),
            Slot::Data(_) | Slot::Named { .. } | Slot::Node(_) => Ok(()),
        }
    }

    /// Constructs a single node, all its dependencies must be built already
    fn build_node(&mut self, node: GraphNode, capability: &Capability) -> Result<(), LoadError> {
        let GraphNode {
            id,
            key,
            instance: name,
            path,
            fields,
            ..
        } = node;

        let values = fields
            .into_iter()
            .map(|(field, slot)| Ok((field, self.rebuild(slot)?)))
            .collect::<Result<IndexMap<_, _>, LoadError>>()?;
        let mut fields = Fields::new(values);

        let result = capability.construct(&mut fields).and_then(|instance| {
            let remaining = fields.remaining();
            if self.options.strict_fields && !remaining.is_empty() {
                return Err(DynError::from(ArgumentError::Unexpected(remaining)));
            }
            Ok(instance)
        });

        let instance = match result {
            Ok(instance) => instance,
            Err(error) => {
                // If one constructor fails - abort the load
                tracing::error!("Constructor for '{key}' at {path} failed: {error}");
                return Err(LoadError::ConstructionError {
                    key,
                    instance: name,
                    path,
                    error: Arc::new(error),
                });
            }
        };

        tracing::debug!("Constructed instance of {} for '{key}'", instance.info.type_name);

        self.entry_of[id.0] = Some(self.entries.len());
        self.built[id.0] = Some(instance.clone());
        self.entries.push(PoolEntry {
            instance,
            name,
            key,
            path,
        });
        Ok(())
    }

    /// Replaces every node in the slot by its built instance
    ///
    /// Named references must be resolved already, any left over is unresolved.
    fn rebuild(&self, slot: Slot) -> Result<Value, LoadError> {
        Ok(match slot {
            Slot::Data(data) => Value::Data(data),
            Slot::Node(id) => Value::Instance(self.instance_of(id)),
            Slot::Named { name, path } => {
                return Err(LoadError::UnresolvedReference { name, path })
            }
            Slot::Type { key, path } => Value::Capability(self.capability_of(&key, &path)?.clone()),
            Slot::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.rebuild(item))
                    .collect::<Result<_, _>>()?,
            ),
            Slot::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(name, field)| Ok((name, self.rebuild(field)?)))
                    .collect::<Result<_, LoadError>>()?,
            ),
        })
    }

    fn instance_of(&self, id: NodeId) -> Instance {
        self.built[id.0]
            .clone()
            .expect("dependencies are built before their dependents")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::document::DocumentNode;

    struct Counter(usize);

    fn initiate(registry: &Registry, document: serde_json::Value) -> Result<InstancePool, LoadError> {
        let options = LoaderOptions::default();
        let mut graph = DependencyGraph::build(DocumentNode::classify(document, &options)?)?;
        graph.resolve()?;
        BlueprintInitiator::new(registry, &options).initiate(graph)
    }

    fn counting_registry(calls: &'static AtomicUsize) -> Registry {
        let mut registry = Registry::new();
        registry
            .register_fn("counter", "1", move |fields| {
                let value = fields.data_opt::<usize>("value")?.unwrap_or_default();
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Counter(value))
            })
            .unwrap();
        registry
    }

    #[test]
    fn registry_misses_fail_before_any_construction() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let registry = counting_registry(&CALLS);

        let error = initiate(
            &registry,
            json!([
                {"$reference": {"registry": {"schema": "counter", "version": "1"}}},
                {"$reference": {"registry": {"schema": "unknown", "version": "1"}, "instance": "x"}},
            ]),
        )
        .unwrap_err();

        match error {
            LoadError::RegistryMiss {
                key,
                instance,
                path,
            } => {
                assert_eq!(key.to_string(), "unknown@1");
                assert_eq!(instance.as_deref(), Some("x"));
                assert_eq!(path.to_string(), "/1");
            }
            other => panic!("expected a registry miss, got {other:?}"),
        }
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unconsumed_fields_fail_in_strict_mode() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let registry = counting_registry(&CALLS);

        let error = initiate(
            &registry,
            json!({"c": {"$reference": {"registry": {"schema": "counter", "version": "1"}, "instance": "c"}, "value": 1, "extra": true}}),
        )
        .unwrap_err();

        match &error {
            LoadError::ConstructionError { instance, .. } => {
                assert_eq!(instance.as_deref(), Some("c"));
                assert_eq!(
                    error.construction_source().unwrap().to_string(),
                    "Unexpected fields: extra"
                );
            }
            other => panic!("expected a construction error, got {other:?}"),
        }
    }

    #[test]
    fn unconsumed_fields_are_ignored_otherwise() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let registry = counting_registry(&CALLS);
        let options = LoaderOptions {
            strict_fields: false,
            ..Default::default()
        };

        let document = json!({"$reference": {"registry": {"schema": "counter", "version": "1"}}, "value": 7, "extra": true});
        let mut graph =
            DependencyGraph::build(DocumentNode::classify(document, &options).unwrap()).unwrap();
        graph.resolve().unwrap();
        let pool = BlueprintInitiator::new(&registry, &options)
            .initiate(graph)
            .unwrap();

        assert_eq!(pool.get::<Counter>().unwrap().0, 7);
        assert_eq!(pool.root().instance::<Counter>().unwrap().0, 7);
    }

    #[test]
    fn unresolved_graphs_fail_instead_of_building() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let registry = counting_registry(&CALLS);
        let options = LoaderOptions::default();

        let document = json!({"c": {"$reference": {"registry": {"schema": "counter", "version": "1"}}, "value": "$elsewhere"}});
        let graph =
            DependencyGraph::build(DocumentNode::classify(document, &options).unwrap()).unwrap();
        let error = BlueprintInitiator::new(&registry, &options)
            .initiate(graph)
            .unwrap_err();

        match error {
            LoadError::UnresolvedReference { name, path } => {
                assert_eq!(name, "elsewhere");
                assert_eq!(path.to_string(), "/c/value");
            }
            other => panic!("expected an unresolved reference, got {other:?}"),
        }
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn type_references_resolve_to_capabilities() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut registry = counting_registry(&CALLS);
        registry
            .register_fn("factory", "1", |fields| fields.capability("product").map_err(Into::into))
            .unwrap();

        let pool = initiate(
            &registry,
            json!({
                "factory": {
                    "$reference": {"registry": {"schema": "factory", "version": "1"}},
                    "product": {"$type": {"registry": {"schema": "counter", "version": "1"}}},
                },
                "counter_type": {"$type": {"registry": {"schema": "counter", "version": "1"}}},
            }),
        )
        .unwrap();

        // Referencing the type builds nothing
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        let factory = pool.get::<Capability>().unwrap();
        let mut fields = Fields::new(IndexMap::from([(
            "value".to_string(),
            Value::Data(json!(5)),
        )]));
        assert_eq!(factory.build::<Counter>(&mut fields).unwrap().0, 5);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);

        assert!(matches!(pool.entry("counter_type"), Some(Value::Capability(_))));
    }

    #[test]
    fn unknown_type_references_fail_before_any_construction() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let registry = counting_registry(&CALLS);

        let error = initiate(
            &registry,
            json!({
                "c": {"$reference": {"registry": {"schema": "counter", "version": "1"}}},
                "t": {"$type": {"registry": {"schema": "missing", "version": "1"}}},
            }),
        )
        .unwrap_err();

        match error {
            LoadError::RegistryMiss { key, path, .. } => {
                assert_eq!(key.to_string(), "missing@1");
                assert_eq!(path.to_string(), "/t");
            }
            other => panic!("expected a registry miss, got {other:?}"),
        }
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn nested_objects_are_built_once_and_shared() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut registry = counting_registry(&CALLS);
        registry
            .register_fn("pair", "1", |fields| {
                Ok((
                    fields.instance::<Counter>("left")?,
                    fields.instance::<Counter>("right")?,
                ))
            })
            .unwrap();

        let pool = initiate(
            &registry,
            json!({
                "pair": {
                    "$reference": {"registry": {"schema": "pair", "version": "1"}},
                    "left": {"$reference": {"registry": {"schema": "counter", "version": "1"}, "instance": "shared"}, "value": 3},
                    "right": "$shared",
                },
                "same": "$shared",
            }),
        )
        .unwrap();

        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        let pair = pool.get::<(Arc<Counter>, Arc<Counter>)>().unwrap();
        let (left, right) = &*pair;
        assert!(Arc::ptr_eq(left, right));
        assert!(Arc::ptr_eq(
            left,
            &pool.entry("same").unwrap().instance::<Counter>().unwrap()
        ));
        assert_eq!(pool.roots().count(), 1);
    }
}
