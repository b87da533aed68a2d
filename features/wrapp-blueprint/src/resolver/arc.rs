use std::{any::type_name, sync::Arc};

use crate::{
    container::InstancePool,
    errors::RequireError,
    fields::{ArgumentError, Value},
    resolver::{ResolveError, Resolver},
    types::Injectable,
};

/// Resolves the top level document entry `field`, falling back to the instance named `field`
///
/// An entry holding anything but an instance is invalid, a null entry counts as absent.
impl<T: ?Sized + Injectable> Resolver for Arc<T> {
    fn resolve(pool: &InstancePool, field: &str) -> Result<Self, ResolveError> {
        match pool.entry(field) {
            Some(Value::Instance(instance)) => {
                instance
                    .downcast()
                    .map_err(|actual_type| RequireError::TypeMismatch {
                        name: field.to_string(),
                        required_type: type_name::<T>(),
                        actual_type,
                    })
                    .map_err(Into::into)
            }
            None | Some(Value::Data(serde_json::Value::Null)) => Ok(pool.get_named(field)?),
            Some(other) => Err(ArgumentError::Mismatch {
                field: field.to_string(),
                expected: type_name::<T>(),
                reason: format!("found {}", other.describe()),
            }
            .into()),
        }
    }
}

impl<Resolvable: Resolver> Resolver for Option<Resolvable> {
    fn resolve(pool: &InstancePool, field: &str) -> Result<Self, ResolveError> {
        match Resolvable::resolve(pool, field) {
            Ok(resolved) => Ok(Some(resolved)),
            // If nothing is there, Option does not fail
            Err(ResolveError::RequireError(RequireError::NotFound { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
