use std::{any::type_name, ops::Deref, sync::Arc};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use crate::{
    container::InstancePool,
    errors::RequireError,
    fields::{ArgumentError, Value},
    registry::Capability,
    resolver::{ResolveError, Resolver},
    types::Injectable,
};

/// The last built instance of `T`, regardless of the field name
#[derive(Debug)]
pub struct ByType<T: ?Sized>(pub Arc<T>);
impl<T: ?Sized> Deref for ByType<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl<T: ?Sized + Injectable> Resolver for ByType<T> {
    fn resolve(pool: &InstancePool, _: &str) -> Result<Self, ResolveError> {
        Ok(ByType(pool.get()?))
    }
}

/// Every instance of `T`, in construction order
impl<T: ?Sized + Injectable> Resolver for Vec<Arc<T>> {
    fn resolve(pool: &InstancePool, _: &str) -> Result<Self, ResolveError> {
        Ok(pool.get_all())
    }
}

/// Every named instance of `T`
impl<T: ?Sized + Injectable> Resolver for IndexMap<String, Arc<T>> {
    fn resolve(pool: &InstancePool, _: &str) -> Result<Self, ResolveError> {
        Ok(pool.get_all_named())
    }
}

/// Plain data of the top level document entry `field`
#[derive(Debug, Clone, PartialEq)]
pub struct Data<T>(pub T);
impl<T> Deref for Data<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl<T> Data<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}
impl<T: DeserializeOwned> Resolver for Data<T> {
    fn resolve(pool: &InstancePool, field: &str) -> Result<Self, ResolveError> {
        let value = pool.entry(field).ok_or_else(|| RequireError::NotFound {
            required_type: type_name::<T>(),
            name: Some(field.to_string()),
        })?;

        Ok(Data(value.deserialize()?))
    }
}

/// The constructor behind a top level type reference `field`
impl Resolver for Capability {
    fn resolve(pool: &InstancePool, field: &str) -> Result<Self, ResolveError> {
        match pool.entry(field) {
            Some(Value::Capability(capability)) => Ok(capability.clone()),
            None => Err(RequireError::NotFound {
                required_type: type_name::<Capability>(),
                name: Some(field.to_string()),
            }
            .into()),
            Some(other) => Err(ArgumentError::Mismatch {
                field: field.to_string(),
                expected: "a type reference",
                reason: format!("found {}", other.describe()),
            }
            .into()),
        }
    }
}
