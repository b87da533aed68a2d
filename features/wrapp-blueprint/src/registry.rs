use std::{any::type_name, collections::HashMap, fmt::Debug, sync::Arc};

use thiserror::Error;

use crate::{
    fields::Fields,
    types::{DynError, Injectable, Instance, RegistryKey, TypeInfo, View},
};

/// A type which can be built from the fields of a reference object
///
/// This is the adapter between document fields and the type's own constructor,
/// fields are taken out of [Fields] by name.
///
/// # Example
/// ```rust
/// use wrapp_blueprint::{Construct, DynError, Fields};
///
/// struct DatabaseService {
///     host: String,
///     port: u16,
/// }
///
/// impl Construct for DatabaseService {
///     fn construct(fields: &mut Fields) -> Result<Self, DynError> {
///         Ok(DatabaseService {
///             host: fields.data("host")?,
///             port: fields.data("port")?,
///         })
///     }
/// }
/// ```
pub trait Construct: Injectable + Sized {
    /// Builds the instance, consuming the fields it needs
    fn construct(fields: &mut Fields) -> Result<Self, DynError>;
}

type ConstructFn = dyn Fn(&mut Fields) -> Result<Instance, DynError> + Send + Sync;
type AliasFn = dyn Fn(&Instance) -> Option<View> + Send + Sync;

/// Builds instances for one [RegistryKey]
#[derive(Clone)]
pub struct Capability {
    supplies: TypeInfo,
    construct: Arc<ConstructFn>,
    aliases: Vec<(TypeInfo, Arc<AliasFn>)>,
}
impl Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("supplies", &self.supplies.type_name)
            .field(
                "aliases",
                &self
                    .aliases
                    .iter()
                    .map(|(info, _)| info.type_name)
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Capability {
    fn new<T, F>(construct: F) -> Self
    where
        T: Injectable,
        F: Fn(&mut Fields) -> Result<T, DynError> + Send + Sync + 'static,
    {
        Capability {
            supplies: TypeInfo::of::<T>(),
            construct: Arc::new(move |fields: &mut Fields| construct(fields).map(Instance::new)),
            aliases: Vec::new(),
        }
    }

    /// The concrete type built by this capability
    pub fn supplies(&self) -> TypeInfo {
        self.supplies
    }

    /// Makes built instances retrievable as `Alias` as well
    ///
    /// `T` must be the type supplied by this capability, usually `Alias` is a trait object:
    /// ```rust
    /// # use std::sync::Arc;
    /// # use wrapp_blueprint::{Construct, DynError, Fields, Registry};
    /// trait Store: Send + Sync {}
    ///
    /// struct Postgres;
    /// impl Store for Postgres {}
    /// impl Construct for Postgres {
    ///     fn construct(_: &mut Fields) -> Result<Self, DynError> {
    ///         Ok(Postgres)
    ///     }
    /// }
    ///
    /// let mut registry = Registry::new();
    /// registry
    ///     .register::<Postgres>("postgres", "1")
    ///     .unwrap()
    ///     .also_as::<Postgres, dyn Store>(|pg| pg as Arc<dyn Store>);
    /// ```
    pub fn also_as<T, Alias>(
        &mut self,
        cast: impl Fn(Arc<T>) -> Arc<Alias> + Send + Sync + 'static,
    ) -> &mut Self
    where
        T: Injectable,
        Alias: ?Sized + Injectable,
    {
        debug_assert_eq!(
            self.supplies,
            TypeInfo::of::<T>(),
            "alias source must be the supplied type"
        );
        let alias: Arc<AliasFn> =
            Arc::new(move |instance: &Instance| instance.get::<T>().map(|it| View::new(cast(it))));
        self.aliases.push((TypeInfo::of::<Alias>(), alias));
        self
    }

    /// Runs the constructor and attaches all alias views
    pub fn construct(&self, fields: &mut Fields) -> Result<Instance, DynError> {
        let mut instance = (self.construct)(fields)?;
        for (_, alias) in &self.aliases {
            if let Some(view) = alias(&instance) {
                instance.add_view(view);
            }
        }
        Ok(instance)
    }

    /// Runs the constructor and returns the new instance as `T`
    ///
    /// Used by instances holding a type reference to build more instances on demand.
    pub fn build<T: ?Sized + Injectable>(&self, fields: &mut Fields) -> Result<Arc<T>, DynError> {
        self.construct(fields)?.downcast().map_err(|actual_type| {
            format!(
                "The constructor supplies '{actual_type}', required: '{}'",
                type_name::<T>()
            )
            .into()
        })
    }
}

/// Errors when trying to register a capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// The key already has a capability
    #[error("A constructor for '{0}' is already registered")]
    AlreadyRegistered(RegistryKey),
}

/// Table of all constructor capabilities, keyed by schema and version
///
/// Built once at startup and only read while loading.
/// Can be shared between threads, loads never modify it.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    capabilities: HashMap<RegistryKey, Capability>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a [Construct] type
    pub fn register<T: Construct>(
        &mut self,
        schema: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<&mut Capability, RegisterError> {
        self.add(RegistryKey::new(schema, version), Capability::new(T::construct))
    }

    /// Registers a closure as constructor
    pub fn register_fn<T, F>(
        &mut self,
        schema: impl Into<String>,
        version: impl Into<String>,
        construct: F,
    ) -> Result<&mut Capability, RegisterError>
    where
        T: Injectable,
        F: Fn(&mut Fields) -> Result<T, DynError> + Send + Sync + 'static,
    {
        self.add(RegistryKey::new(schema, version), Capability::new(construct))
    }

    fn add(
        &mut self,
        key: RegistryKey,
        capability: Capability,
    ) -> Result<&mut Capability, RegisterError> {
        if self.capabilities.contains_key(&key) {
            return Err(RegisterError::AlreadyRegistered(key));
        }

        tracing::debug!("Registered '{}' for {key}", capability.supplies);
        Ok(self.capabilities.entry(key).or_insert(capability))
    }

    /// Returns the capability for a key
    pub fn lookup(&self, key: &RegistryKey) -> Option<&Capability> {
        self.capabilities.get(key)
    }

    pub fn contains(&self, key: &RegistryKey) -> bool {
        self.capabilities.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fields::Value;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English {
        name: String,
    }
    impl Greeter for English {
        fn greet(&self) -> String {
            format!("Hello {}", self.name)
        }
    }
    impl Construct for English {
        fn construct(fields: &mut Fields) -> Result<Self, DynError> {
            Ok(English {
                name: fields.data("name")?,
            })
        }
    }

    fn name_fields(name: &str) -> Fields {
        Fields::new([("name".to_string(), Value::Data(json!(name)))].into())
    }

    #[test]
    fn registers_and_constructs() {
        let mut registry = Registry::new();
        registry.register::<English>("greeter", "1.0.0").unwrap();

        let key = RegistryKey::new("greeter", "1.0.0");
        let capability = registry.lookup(&key).unwrap();
        assert_eq!(capability.supplies(), TypeInfo::of::<English>());

        let instance = capability.construct(&mut name_fields("Ada")).unwrap();
        assert_eq!(instance.get::<English>().unwrap().name, "Ada");
        assert!(registry.lookup(&RegistryKey::new("greeter", "2.0.0")).is_none());
    }

    #[test]
    fn rejects_duplicate_keys() {
        let mut registry = Registry::new();
        registry.register::<English>("greeter", "1.0.0").unwrap();

        let error = registry
            .register_fn("greeter", "1.0.0", |_| Ok(1_u32))
            .unwrap_err();
        assert_eq!(
            error,
            RegisterError::AlreadyRegistered(RegistryKey::new("greeter", "1.0.0"))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn aliases_share_the_instance() {
        let mut registry = Registry::new();
        registry
            .register::<English>("greeter", "1.0.0")
            .unwrap()
            .also_as::<English, dyn Greeter>(|english| english as Arc<dyn Greeter>);

        let capability = registry.lookup(&RegistryKey::new("greeter", "1.0.0")).unwrap();
        let instance = capability.construct(&mut name_fields("Grace")).unwrap();

        let greeter = instance.get::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "Hello Grace");
        assert_eq!(
            Arc::as_ptr(&greeter) as *const (),
            Arc::as_ptr(&instance.get::<English>().unwrap()) as *const ()
        );
    }

    #[test]
    fn build_checks_the_supplied_type() {
        let mut registry = Registry::new();
        registry.register::<English>("greeter", "1.0.0").unwrap();
        let capability = registry.lookup(&RegistryKey::new("greeter", "1.0.0")).unwrap();

        let english = capability.build::<English>(&mut name_fields("Ada")).unwrap();
        assert_eq!(english.name, "Ada");

        let error = capability
            .build::<String>(&mut name_fields("Ada"))
            .unwrap_err();
        assert!(error.to_string().contains("required: 'alloc::string::String'"));
    }

    #[test]
    fn closure_errors_are_returned() {
        let mut registry = Registry::new();
        registry
            .register_fn::<u32, _>("answer", "1", |fields| Ok(fields.data("value")?))
            .unwrap();

        let capability = registry.lookup(&RegistryKey::new("answer", "1")).unwrap();
        let error = capability.construct(&mut Fields::default()).unwrap_err();
        assert_eq!(error.to_string(), "Missing field 'value'");
    }
}
