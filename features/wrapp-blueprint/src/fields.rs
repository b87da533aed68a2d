use std::{any::type_name, sync::Arc};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::{
    registry::Capability,
    types::{Injectable, Instance},
};

/// A document position after instantiation
///
/// Reference objects and named references are replaced by the built [Instance],
/// type references by the registered [Capability], everything else keeps its shape.
#[derive(Debug, Clone)]
pub enum Value {
    Data(JsonValue),
    Instance(Instance),
    Capability(Capability),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Returns the instance as `T`, if this is an instance viewable as `T`
    pub fn instance<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        match self {
            Value::Instance(instance) => instance.get(),
            _ => None,
        }
    }

    /// Returns the value at the given key, if this is an object
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Converts the value back into plain data
    ///
    /// Fails if the value contains any instance.
    pub fn to_json(&self) -> Result<JsonValue, ArgumentError> {
        match self {
            Value::Data(data) => Ok(data.clone()),
            Value::Instance(instance) => Err(ArgumentError::Mismatch {
                field: String::new(),
                expected: "plain data",
                reason: format!("found an instance of '{}'", instance.info.type_name),
            }),
            Value::Capability(capability) => Err(ArgumentError::Mismatch {
                field: String::new(),
                expected: "plain data",
                reason: format!("found the constructor of '{}'", capability.supplies()),
            }),
            Value::Array(items) => items
                .iter()
                .map(Value::to_json)
                .collect::<Result<_, _>>()
                .map(JsonValue::Array),
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| Ok((key.clone(), value.to_json()?)))
                .collect::<Result<_, _>>()
                .map(JsonValue::Object),
        }
    }

    /// Deserializes the value into `T`
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ArgumentError> {
        let data = self.to_json()?;
        serde_json::from_value(data).map_err(|e| ArgumentError::Mismatch {
            field: String::new(),
            expected: type_name::<T>(),
            reason: e.to_string(),
        })
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Value::Data(JsonValue::Null) => "null".to_string(),
            Value::Data(JsonValue::Bool(_)) => "a bool".to_string(),
            Value::Data(JsonValue::Number(_)) => "a number".to_string(),
            Value::Data(JsonValue::String(_)) => "a string".to_string(),
            Value::Data(JsonValue::Array(_)) | Value::Array(_) => "an array".to_string(),
            Value::Data(JsonValue::Object(_)) | Value::Object(_) => "an object".to_string(),
            Value::Instance(instance) => format!("an instance of '{}'", instance.info.type_name),
            Value::Capability(capability) => {
                format!("the constructor of '{}'", capability.supplies())
            }
        }
    }
}

/// Errors while binding fields to constructor arguments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    /// A required field is not present
    #[error("Missing field '{0}'")]
    Missing(String),
    /// The field does not hold the expected kind of value
    #[error("Field '{field}' expected '{expected}': {reason}")]
    Mismatch {
        field: String,
        expected: &'static str,
        reason: String,
    },
    /// The constructor did not consume these fields
    #[error("Unexpected fields: {}", .0.join(", "))]
    Unexpected(Vec<String>),
}
impl ArgumentError {
    fn for_field(self, name: &str) -> Self {
        match self {
            ArgumentError::Mismatch {
                expected, reason, ..
            } => ArgumentError::Mismatch {
                field: name.to_string(),
                expected,
                reason,
            },
            other => other,
        }
    }
}

/// Keyword arguments for a constructor
///
/// Fields are taken out by name, what is left after construction is reported as unexpected.
#[derive(Debug, Default)]
pub struct Fields {
    values: IndexMap<String, Value>,
}

impl Fields {
    pub fn new(values: IndexMap<String, Value>) -> Self {
        Self { values }
    }

    /// Takes the raw value of a field
    pub fn value(&mut self, name: &str) -> Result<Value, ArgumentError> {
        self.values
            .shift_remove(name)
            .ok_or_else(|| ArgumentError::Missing(name.to_string()))
    }

    /// Takes a field holding plain data
    pub fn data<T: DeserializeOwned>(&mut self, name: &str) -> Result<T, ArgumentError> {
        self.value(name)?
            .deserialize()
            .map_err(|e| e.for_field(name))
    }

    /// Takes a field holding plain data, None if absent or null
    pub fn data_opt<T: DeserializeOwned>(&mut self, name: &str) -> Result<Option<T>, ArgumentError> {
        match self.values.shift_remove(name) {
            None | Some(Value::Data(JsonValue::Null)) => Ok(None),
            Some(value) => value.deserialize().map(Some).map_err(|e| e.for_field(name)),
        }
    }

    /// Takes a field holding an instance
    pub fn instance<T: ?Sized + Injectable>(&mut self, name: &str) -> Result<Arc<T>, ArgumentError> {
        let value = self.value(name)?;
        value.instance().ok_or_else(|| ArgumentError::Mismatch {
            field: name.to_string(),
            expected: type_name::<T>(),
            reason: format!("found {}", value.describe()),
        })
    }

    /// Takes a field holding an instance, None if absent or null
    pub fn instance_opt<T: ?Sized + Injectable>(
        &mut self,
        name: &str,
    ) -> Result<Option<Arc<T>>, ArgumentError> {
        match self.values.get(name) {
            None | Some(Value::Data(JsonValue::Null)) => {
                self.values.shift_remove(name);
                Ok(None)
            }
            Some(_) => self.instance(name).map(Some),
        }
    }

    /// Takes a field holding a type reference
    pub fn capability(&mut self, name: &str) -> Result<Capability, ArgumentError> {
        match self.value(name)? {
            Value::Capability(capability) => Ok(capability),
            other => Err(ArgumentError::Mismatch {
                field: name.to_string(),
                expected: "a type reference",
                reason: format!("found {}", other.describe()),
            }),
        }
    }

    /// Takes a field holding an array of instances
    pub fn instances<T: ?Sized + Injectable>(
        &mut self,
        name: &str,
    ) -> Result<Vec<Arc<T>>, ArgumentError> {
        let mismatch = |reason: String| ArgumentError::Mismatch {
            field: name.to_string(),
            expected: type_name::<Vec<Arc<T>>>(),
            reason,
        };

        match self.value(name)? {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    item.instance()
                        .ok_or_else(|| mismatch(format!("item {index} is {}", item.describe())))
                })
                .collect(),
            Value::Data(JsonValue::Array(items)) if items.is_empty() => Ok(Vec::new()),
            other => Err(mismatch(format!("found {}", other.describe()))),
        }
    }

    /// Checks if a field is still present
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Names of all fields not taken yet
    pub fn remaining(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}
