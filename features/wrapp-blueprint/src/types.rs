use std::{
    any::{Any, TypeId},
    fmt::Debug,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// All errors must be Send + Sync, so loads can run on any thread
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Registries are shared between threads and loads may run concurrently
/// So anything built from a document needs to be Send + Sync + 'static
///
/// Unsized types (trait objects) are allowed, so instances can be retrieved through an alias view.
pub trait Injectable: Send + Sync + 'static {}
impl<T: ?Sized + Send + Sync + 'static> Injectable for T {}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}

/// Identifies a constructor capability in the [crate::registry::Registry]
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryKey {
    pub schema: String,
    pub version: String,
}
impl RegistryKey {
    pub fn new(schema: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            version: version.into(),
        }
    }
}
impl std::fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.schema, self.version)
    }
}

/// One way of looking at an [Instance]
///
/// `handle` always holds an `Arc<T>` where `T` is described by `info`.
/// Storing the Arc itself (instead of `T`) allows views of unsized types like `dyn Trait`.
#[derive(Clone)]
pub(crate) struct View {
    pub info: TypeInfo,
    handle: Arc<dyn Any + Send + Sync>,
}
impl View {
    pub(crate) fn new<T: ?Sized + Injectable>(instance: Arc<T>) -> Self {
        View {
            info: TypeInfo::of::<T>(),
            handle: Arc::new(instance),
        }
    }

    fn get<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        self.handle.downcast_ref::<Arc<T>>().cloned()
    }
}

/// A built object
///
/// Cloning an Instance is cheap and keeps the identity: all clones point to the same object.
#[derive(Clone)]
pub struct Instance {
    /// The concrete type built by the constructor
    pub info: TypeInfo,
    /// Address of the built object, used for identity checks
    address: usize,
    /// Primary view first, followed by alias views
    views: Vec<View>,
}
impl Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Instance").field(&self.info.type_name).finish()
    }
}

impl Instance {
    pub(crate) fn new<T: Injectable>(instance: T) -> Self {
        let instance = Arc::new(instance);
        Instance {
            info: TypeInfo::of::<T>(),
            address: Arc::as_ptr(&instance) as *const () as usize,
            views: vec![View::new(instance)],
        }
    }

    pub(crate) fn add_view(&mut self, view: View) {
        if !self.is_a(view.info.type_id) {
            self.views.push(view);
        }
    }

    /// Returns the instance as `T`, if it was built as `T` or registered with an alias for `T`
    pub fn get<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        let type_id = TypeId::of::<T>();
        self.views
            .iter()
            .find(|view| view.info.type_id == type_id)
            .and_then(|view| view.get::<T>())
    }

    /// Downcasts the instance, returning the actual type name on failure
    pub fn downcast<T: ?Sized + Injectable>(&self) -> Result<Arc<T>, &'static str> {
        self.get().ok_or(self.info.type_name)
    }

    /// Checks whether the instance can be viewed as the given type
    pub fn is_a(&self, type_id: TypeId) -> bool {
        self.views.iter().any(|view| view.info.type_id == type_id)
    }

    /// All types this instance can be retrieved as
    pub fn types(&self) -> impl Iterator<Item = TypeInfo> + '_ {
        self.views.iter().map(|view| view.info)
    }

    /// Checks if both instances are the same object
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        self.address == other.address
    }
}
