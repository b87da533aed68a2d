//! Typed projection of an [InstancePool]
//!
//! A [Projection] describes the structure an application expects from a loaded document.
//! Each field is pulled from the pool with a [Resolver], failures are collected so the caller
//! sees every invalid field at once.
//!
//! ```rust
//! use std::sync::Arc;
//! use wrapp_blueprint::{Projection, Projector};
//!
//! struct Database;
//!
//! struct App {
//!     db: Arc<Database>,
//!     replicas: Vec<Arc<Database>>,
//! }
//!
//! impl Projection for App {
//!     fn project(p: &mut Projector<'_>) -> Option<Self> {
//!         let db = p.field("db");
//!         let replicas = p.field("replicas");
//!         Some(App {
//!             db: db?,
//!             replicas: replicas?,
//!         })
//!     }
//! }
//! ```

use std::any::type_name;

use thiserror::Error;

use crate::{
    container::InstancePool,
    errors::{FieldError, RequireError, ValidationErrors},
    fields::ArgumentError,
};

pub mod arc;
pub mod collections;

/// Errors when resolving a single field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Could not find a matching instance
    #[error(transparent)]
    RequireError(#[from] RequireError),
    /// The value exists but is not valid for the field
    #[error(transparent)]
    Invalid(#[from] ArgumentError),
}

/// Allows custom behaviour when pulling a field out of the pool
pub trait Resolver {
    fn resolve(pool: &InstancePool, field: &str) -> Result<Self, ResolveError>
    where
        Self: Sized;
}

/// A structure which can be validated and built from an [InstancePool]
pub trait Projection: Sized {
    /// Pulls every field from the projector
    ///
    /// Resolve all fields before returning, so every failing field gets reported.
    /// Returns None if any field failed.
    fn project(p: &mut Projector<'_>) -> Option<Self>;
}

/// Collects fields and their errors for a [Projection]
pub struct Projector<'p> {
    pool: &'p InstancePool,
    errors: Vec<FieldError>,
}

impl<'p> Projector<'p> {
    pub fn new(pool: &'p InstancePool) -> Self {
        Self {
            pool,
            errors: Vec::new(),
        }
    }

    pub fn pool(&self) -> &'p InstancePool {
        self.pool
    }

    /// Resolves a field, recording the error if it fails
    pub fn field<R: Resolver>(&mut self, name: &str) -> Option<R> {
        match R::resolve(self.pool, name) {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                tracing::debug!("Projection field '{name}' is invalid: {e}");
                self.fail(name, e.to_string());
                None
            }
        }
    }

    /// Records a custom validation, returns the condition
    pub fn check(&mut self, field: &str, condition: bool, reason: impl Into<String>) -> bool {
        if !condition {
            self.fail(field, reason);
        }
        condition
    }

    /// Records an error for a field
    pub fn fail(&mut self, field: &str, reason: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            reason: reason.into(),
        });
    }

    /// Runs the projection, failing with all recorded errors
    pub fn run<P: Projection>(mut self) -> Result<P, ValidationErrors> {
        let projected = P::project(&mut self);

        match (projected, self.errors.is_empty()) {
            (Some(projected), true) => Ok(projected),
            (None, true) => Err(ValidationErrors {
                errors: vec![FieldError {
                    field: type_name::<P>().to_string(),
                    reason: "the projection returned no value".to_string(),
                }],
            }),
            (_, false) => Err(ValidationErrors {
                errors: self.errors,
            }),
        }
    }
}
