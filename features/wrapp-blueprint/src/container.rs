use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
};

use indexmap::IndexMap;

use crate::{
    document::DocPath,
    errors::{RequireError, ValidationErrors},
    fields::Value,
    resolver::{Projection, Projector},
    types::{Injectable, Instance, RegistryKey},
};

/// One built instance and where it came from
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub instance: Instance,
    /// Declared instance name, None for anonymous instances
    pub name: Option<String>,
    pub key: RegistryKey,
    pub path: DocPath,
}

/// All instances built by one load
///
/// Cloning the pool is cheap, every load produces a new independent pool.
#[derive(Clone)]
pub struct InstancePool(pub Arc<InstancePoolInner>);
pub struct InstancePoolInner {
    /// In construction order
    entries: Vec<PoolEntry>,
    by_type: HashMap<TypeId, Vec<usize>>,
    by_name: HashMap<String, usize>,
    /// Top level reference objects, in document order
    roots: Vec<usize>,
    /// The document with every reference replaced by its instance
    root: Value,
    /// Prefix of named references, accepted in front of instance names
    sigil: String,
}
impl Debug for InstancePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for entry in &self.0.entries {
            match &entry.name {
                Some(name) => list.entry(&format_args!("{name}: {}", entry.instance.info)),
                None => list.entry(&format_args!("{}", entry.instance.info)),
            };
        }
        list.finish()
    }
}

impl InstancePool {
    pub(crate) fn new(entries: Vec<PoolEntry>, roots: Vec<usize>, root: Value, sigil: &str) -> Self {
        let mut by_type: HashMap<TypeId, Vec<usize>> = HashMap::new();
        let mut by_name = HashMap::new();

        for (index, entry) in entries.iter().enumerate() {
            for info in entry.instance.types() {
                by_type.entry(info.type_id).or_default().push(index);
            }
            if let Some(name) = &entry.name {
                by_name.insert(name.clone(), index);
            }
        }

        Self(Arc::new(InstancePoolInner {
            entries,
            by_type,
            by_name,
            roots,
            root,
            sigil: sigil.to_string(),
        }))
    }

    /// Returns the last built instance of `T`
    pub fn get<T: ?Sized + Injectable>(&self) -> Result<Arc<T>, RequireError> {
        self.indexes_of::<T>()
            .last()
            .and_then(|index| self.0.entries[*index].instance.get::<T>())
            .ok_or(RequireError::NotFound {
                required_type: type_name::<T>(),
                name: None,
            })
    }

    /// Returns the instance declared under `name`, if it is a `T`
    ///
    /// The name may be given as a named reference too, `"$main_db"` finds `main_db`.
    pub fn get_named<T: ?Sized + Injectable>(&self, name: &str) -> Result<Arc<T>, RequireError> {
        let Some(entry) = self.entry_named(name) else {
            return Err(RequireError::NotFound {
                required_type: type_name::<T>(),
                name: Some(name.to_string()),
            });
        };

        entry
            .instance
            .downcast()
            .map_err(|actual_type| RequireError::TypeMismatch {
                name: name.to_string(),
                required_type: type_name::<T>(),
                actual_type,
            })
    }

    /// Returns every instance of `T`, in construction order
    pub fn get_all<T: ?Sized + Injectable>(&self) -> Vec<Arc<T>> {
        self.indexes_of::<T>()
            .iter()
            .filter_map(|index| self.0.entries[*index].instance.get::<T>())
            .collect()
    }

    /// Returns every named instance of `T` by name, in construction order
    ///
    /// Anonymous instances are left out.
    pub fn get_all_named<T: ?Sized + Injectable>(&self) -> IndexMap<String, Arc<T>> {
        self.indexes_of::<T>()
            .iter()
            .map(|index| &self.0.entries[*index])
            .filter_map(|entry| Some((entry.name.clone()?, entry.instance.get::<T>()?)))
            .collect()
    }

    /// Returns the entry of a named instance
    pub fn entry_named(&self, name: &str) -> Option<&PoolEntry> {
        self.index_named(name).map(|index| &self.0.entries[index])
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.index_named(name).is_some()
    }

    fn index_named(&self, name: &str) -> Option<usize> {
        self.0.by_name.get(name).copied().or_else(|| {
            let name = name.strip_prefix(self.0.sigil.as_str())?;
            self.0.by_name.get(name).copied()
        })
    }

    /// The loaded document, with every reference replaced by its instance
    pub fn root(&self) -> &Value {
        &self.0.root
    }

    /// A top level entry of the loaded document
    pub fn entry(&self, key: &str) -> Option<&Value> {
        self.0.root.get(key)
    }

    /// Instances not nested in other reference objects, in document order
    pub fn roots(&self) -> impl Iterator<Item = &PoolEntry> + '_ {
        self.0.roots.iter().map(|index| &self.0.entries[*index])
    }

    /// All entries in construction order
    pub fn iter(&self) -> impl Iterator<Item = &PoolEntry> + '_ {
        self.0.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.0.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.entries.is_empty()
    }

    /// Validates the pool against a [Projection]
    pub fn project<P: Projection>(&self) -> Result<P, ValidationErrors> {
        Projector::new(self).run()
    }

    fn indexes_of<T: ?Sized + 'static>(&self) -> &[usize] {
        self.0
            .by_type
            .get(&TypeId::of::<T>())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
