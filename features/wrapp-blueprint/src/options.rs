use serde::Deserialize;

/// Settings of a [crate::builder::Loader]
///
/// Can be read from the application's own configuration, missing keys fall back to the defaults.
///
/// ```rust
/// use wrapp_blueprint::LoaderOptions;
///
/// let options: LoaderOptions = serde_json::from_str(r#"{ "sigil": "@" }"#).unwrap();
/// assert_eq!(options.reference_key, "$reference");
/// assert_eq!(options.type_key, "$type");
/// assert_eq!(options.sigil, "@");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Map key marking a map as a reference object
    pub reference_key: String,
    /// Map key marking a map as a reference to a registered constructor
    pub type_key: String,
    /// Prefix marking a string as a named reference
    pub sigil: String,
    /// Fail construction if a constructor did not consume every field
    pub strict_fields: bool,
}
impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            reference_key: "$reference".to_string(),
            type_key: "$type".to_string(),
            sigil: "$".to_string(),
            strict_fields: true,
        }
    }
}
impl LoaderOptions {
    /// Returns the referenced name if the string is a named reference
    pub(crate) fn named_reference<'a>(&self, value: &'a str) -> Option<&'a str> {
        value.strip_prefix(self.sigil.as_str())
    }
}
