//! Wrapp Blueprint builds a graph of wired instances from a declarative document.
//!
//! A document is a tree of maps, arrays and scalars. Maps carrying a `"$reference"` key are
//! built by constructors registered under a schema and version, strings starting with `$`
//! point to instances declared by name. Instances are built in dependency order, each one
//! exactly once, and shared by everything referencing it. A map holding only a `"$type"` key
//! stands for the registered constructor itself, for factories building instances on demand.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use wrapp_blueprint::{Construct, DynError, Fields, Loader, Registry};
//!
//! struct DatabaseService {
//!     host: String,
//!     port: u16,
//! }
//! impl Construct for DatabaseService {
//!     fn construct(fields: &mut Fields) -> Result<Self, DynError> {
//!         Ok(DatabaseService {
//!             host: fields.data("host")?,
//!             port: fields.data("port")?,
//!         })
//!     }
//! }
//!
//! struct UserService {
//!     db: Arc<DatabaseService>,
//!     cache_enabled: bool,
//! }
//! impl Construct for UserService {
//!     fn construct(fields: &mut Fields) -> Result<Self, DynError> {
//!         Ok(UserService {
//!             db: fields.instance("db")?,
//!             cache_enabled: fields.data("cache_enabled")?,
//!         })
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry.register::<DatabaseService>("database", "1.0.0").unwrap();
//! registry.register::<UserService>("user_service", "1.0.0").unwrap();
//!
//! let pool = Loader::new(&registry)
//!     .load_raw(json!({
//!         "db": {
//!             "$reference": {"registry": {"schema": "database", "version": "1.0.0"}, "instance": "main_db"},
//!             "host": "localhost",
//!             "port": 5432
//!         },
//!         "svc": {
//!             "$reference": {"registry": {"schema": "user_service", "version": "1.0.0"}},
//!             "db": "$main_db",
//!             "cache_enabled": true
//!         }
//!     }))
//!     .unwrap();
//!
//! let db = pool.get_named::<DatabaseService>("main_db").unwrap();
//! let svc = pool.get::<UserService>().unwrap();
//! assert!(Arc::ptr_eq(&db, &svc.db));
//! assert_eq!(svc.db.port, 5432);
//! ```
//!
//! Wrapp Blueprint consists of the following components:
//!
//! 1. Registry - constructors by schema and version
//! 2. Document - classifying the raw document
//! 3. Dependency Graph - resolving references and ordering construction
//! 4. Initiator - building instances
//! 5. Container - the InstancePool for retrieval
//! 6. Resolver - typed projections over the pool

pub mod builder;
pub mod container;
pub(crate) mod dependency_graph;
pub mod document;
pub mod errors;
pub mod fields;
pub(crate) mod initiator;
pub mod options;
pub mod registry;
pub mod resolver;
pub mod types;

pub use builder::Loader;
pub use container::{InstancePool, PoolEntry};
pub use document::{DocPath, DocumentNode, ReferenceObject};
pub use errors::{Error, FieldError, LoadError, RequireError, ValidationErrors};
pub use fields::{ArgumentError, Fields, Value};
pub use options::LoaderOptions;
pub use registry::{Capability, Construct, RegisterError, Registry};
pub use resolver::{
    collections::{ByType, Data},
    Projection, Projector, ResolveError, Resolver,
};
pub use types::{DynError, Injectable, Instance, RegistryKey, TypeInfo};
