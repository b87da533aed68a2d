//! Classification of the raw document tree
//!
//! Every position of a parsed document is one of:
//! - a scalar, passed through as is
//! - a named reference (`"$main_db"`), pointing to a declared instance
//! - a reference object, a map carrying the reference marker key, built by a registered constructor
//! - a type reference, a map holding only the type marker key, standing for the constructor itself
//! - a plain object or array, rebuilt structurally

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};

use crate::{errors::LoadError, options::LoaderOptions, types::RegistryKey};

/// Position inside a document, displayed as a JSON pointer (RFC 6901)
///
/// The document root is the empty pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DocPath(Vec<String>);
impl DocPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn join(&self, segment: impl ToString) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}
impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for segment in &self.0 {
            write!(f, "/{}", segment.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

/// The classified form of one document position
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentNode {
    /// Any primitive which is not a named reference
    Scalar(JsonValue),
    /// Use the instance declared under this name
    NamedReference(String),
    /// Build an instance with a registered constructor
    ReferenceObject(ReferenceObject),
    /// Use the registered constructor itself
    TypeReference(RegistryKey),
    /// Plain map without reference marker
    Object(IndexMap<String, DocumentNode>),
    Array(Vec<DocumentNode>),
}

/// A map carrying the reference marker key
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceObject {
    pub key: RegistryKey,
    /// Declared instance name, anonymous if None
    pub instance: Option<String>,
    /// All fields except the marker key
    pub fields: IndexMap<String, DocumentNode>,
}

impl DocumentNode {
    /// Classifies a parsed document
    pub fn classify(value: JsonValue, options: &LoaderOptions) -> Result<Self, LoadError> {
        classify_at(value, options, &DocPath::root())
    }
}

fn classify_at(
    value: JsonValue,
    options: &LoaderOptions,
    path: &DocPath,
) -> Result<DocumentNode, LoadError> {
    match value {
        JsonValue::String(string) => match options.named_reference(&string) {
            Some("") => Err(LoadError::MalformedReference {
                path: path.clone(),
                reason: format!("'{string}' does not name an instance"),
            }),
            Some(name) => {
                tracing::trace!("Named reference '{name}' at {path}");
                Ok(DocumentNode::NamedReference(name.to_string()))
            }
            None => Ok(DocumentNode::Scalar(JsonValue::String(string))),
        },
        JsonValue::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| classify_at(item, options, &path.join(index)))
            .collect::<Result<_, _>>()
            .map(DocumentNode::Array),
        JsonValue::Object(mut map) => match map.shift_remove(&options.reference_key) {
            Some(marker) => {
                let (key, instance) = parse_marker(marker, &path.join(&options.reference_key))?;
                tracing::trace!("Reference object for '{key}' at {path}");
                Ok(DocumentNode::ReferenceObject(ReferenceObject {
                    key,
                    instance,
                    fields: classify_map(map, options, path)?,
                }))
            }
            None => match map.shift_remove(&options.type_key) {
                Some(marker) => {
                    let marker_path = path.join(&options.type_key);
                    if let Some(extra) = map.keys().next() {
                        return Err(LoadError::MalformedReference {
                            path: path.join(extra),
                            reason: "a type reference takes no fields".to_string(),
                        });
                    }
                    let (key, instance) = parse_marker(marker, &marker_path)?;
                    if instance.is_some() {
                        return Err(LoadError::MalformedReference {
                            path: marker_path,
                            reason: "a type reference does not declare an instance".to_string(),
                        });
                    }
                    tracing::trace!("Type reference to '{key}' at {path}");
                    Ok(DocumentNode::TypeReference(key))
                }
                None => classify_map(map, options, path).map(DocumentNode::Object),
            },
        },
        scalar => Ok(DocumentNode::Scalar(scalar)),
    }
}

fn classify_map(
    map: Map<String, JsonValue>,
    options: &LoaderOptions,
    path: &DocPath,
) -> Result<IndexMap<String, DocumentNode>, LoadError> {
    map.into_iter()
        .map(|(name, value)| {
            let node = classify_at(value, options, &path.join(&name))?;
            Ok((name, node))
        })
        .collect()
}

/// Parses `{"registry": {"schema": .., "version": ..}, "instance"?: ..}`
fn parse_marker(
    marker: JsonValue,
    path: &DocPath,
) -> Result<(RegistryKey, Option<String>), LoadError> {
    let malformed = |reason: &str| LoadError::MalformedReference {
        path: path.clone(),
        reason: reason.to_string(),
    };

    let JsonValue::Object(mut marker) = marker else {
        return Err(malformed("the reference marker must be a map"));
    };

    let Some(JsonValue::Object(registry)) = marker.shift_remove("registry") else {
        return Err(malformed("'registry' must be a map with 'schema' and 'version'"));
    };
    let Some(JsonValue::String(schema)) = registry.get("schema") else {
        return Err(malformed("'registry.schema' must be a string"));
    };
    let Some(JsonValue::String(version)) = registry.get("version") else {
        return Err(malformed("'registry.version' must be a string"));
    };

    let instance = match marker.shift_remove("instance") {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::String(name)) if !name.is_empty() => Some(name),
        Some(_) => return Err(malformed("'instance' must be a non empty string")),
    };

    for ignored in marker.keys() {
        tracing::warn!("Ignoring unknown key '{ignored}' in reference marker at {path}");
    }

    Ok((RegistryKey::new(schema.as_str(), version.as_str()), instance))
}
