use std::sync::Arc;

use thiserror::Error;

use crate::{
    document::DocPath,
    types::{DynError, RegistryKey},
};

/// Errors while loading a document into an [crate::container::InstancePool]
///
/// Any of these aborts the whole load, no partial pool is returned.
#[derive(Error, Debug, Clone)]
pub enum LoadError {
    /// The document text could not be parsed
    #[error("The document could not be parsed: {0}")]
    Parse(String),

    /// A reference marker or named reference is not well formed
    #[error("Malformed reference at '{path}': {reason}")]
    MalformedReference { path: DocPath, reason: String },

    /// Two reference objects declare the same instance name
    #[error("The instance name '{name}' is declared at '{first}' and again at '{second}'")]
    DuplicateSingletonName {
        name: String,
        first: DocPath,
        second: DocPath,
    },

    /// A named reference does not point to any declared instance
    #[error("'{name}' referenced at '{path}' is not declared by any reference object")]
    UnresolvedReference { name: String, path: DocPath },

    /// The reference objects depend on each other in a cycle
    #[error("A circular dependency exists through {}", .path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    /// No constructor is registered for the requested schema and version
    #[error("No constructor registered for '{key}' - required by {} at '{path}'", label(.instance))]
    RegistryMiss {
        key: RegistryKey,
        instance: Option<String>,
        path: DocPath,
    },

    /// The constructor failed
    #[error("Constructor for '{key}' failed while building {} at '{path}' - error: {error}", label(.instance))]
    ConstructionError {
        key: RegistryKey,
        instance: Option<String>,
        path: DocPath,
        error: Arc<DynError>,
    },
}
impl LoadError {
    /// Returns the underlying constructor error, if this is a [LoadError::ConstructionError]
    pub fn construction_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            LoadError::ConstructionError { error, .. } => Some(&***error),
            _ => None,
        }
    }
}

fn named(name: &Option<String>) -> String {
    match name {
        Some(name) => format!(" named '{name}'"),
        None => String::new(),
    }
}

fn label(instance: &Option<String>) -> String {
    match instance {
        Some(name) => format!("instance '{name}'"),
        None => "an anonymous instance".to_string(),
    }
}

/// Errors when trying to retrieve an instance from the pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequireError {
    /// No instance matches the request
    #[error("No instance of '{required_type}'{} was built", named(.name))]
    NotFound {
        required_type: &'static str,
        name: Option<String>,
    },

    /// The named instance exists, but has a different type
    #[error("The instance '{name}' is a '{actual_type}', required: '{required_type}'")]
    TypeMismatch {
        name: String,
        required_type: &'static str,
        actual_type: &'static str,
    },
}

/// A single failed field of a typed projection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

/// All field errors of a typed projection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}
impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The projection had one or more invalid fields:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}
impl ValidationErrors {
    /// Checks if a given field failed
    pub fn contains(&self, field: &str) -> bool {
        self.errors.iter().any(|error| error.field == field)
    }
}

/// Errors of a typed load
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}
