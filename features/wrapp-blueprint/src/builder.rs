use serde_json::Value as JsonValue;

use crate::{
    container::InstancePool,
    dependency_graph::DependencyGraph,
    document::DocumentNode,
    errors::{Error, LoadError},
    initiator::BlueprintInitiator,
    options::LoaderOptions,
    registry::Registry,
    resolver::Projection,
};

//////////////////////////////////////////////////////////////////////
///
/// Loading consists of three Parts.
/// 1. The Registry where one registers all constructors, once at startup
/// 2. The Loader, which turns a document into a graph and builds it
/// 3. The InstancePool holding the result of one load

/// Loads documents into [InstancePool]s using the constructors of a [Registry]
///
/// Every load is independent, a Loader can be reused and shared between threads.
#[derive(Debug, Clone)]
pub struct Loader<'r> {
    registry: &'r Registry,
    options: LoaderOptions,
}

impl<'r> Loader<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Loader {
            registry,
            options: LoaderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Builds every reference object of the document
    ///
    /// Either returns a fully wired pool or the first error, nothing is kept on failure.
    pub fn load_raw(&self, document: JsonValue) -> Result<InstancePool, LoadError> {
        let document = DocumentNode::classify(document, &self.options)?;

        let mut graph = DependencyGraph::build(document)?;
        graph.resolve()?;

        BlueprintInitiator::new(self.registry, &self.options).initiate(graph)
    }

    /// Parses a JSON document and loads it
    pub fn load_str(&self, document: &str) -> Result<InstancePool, LoadError> {
        let document =
            serde_json::from_str(document).map_err(|e| LoadError::Parse(e.to_string()))?;
        self.load_raw(document)
    }

    /// Loads the document and validates it against a [Projection]
    pub fn load_typed<P: Projection>(&self, document: JsonValue) -> Result<P, Error> {
        let pool = self.load_raw(document)?;
        Ok(pool.project()?)
    }
}
