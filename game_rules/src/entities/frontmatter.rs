//! Frontmatter field definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SharedCallable;
use crate::error::CallError;

/// A typed field an entity expects in its note's frontmatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontmatterField {
    pub name: String,

    /// Declared value type (`"number"`, `"string"`, `"boolean"`, ...).
    #[serde(rename = "type")]
    pub field_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Computes the value from the rest of the frontmatter.
    #[serde(skip)]
    pub derived: Option<SharedCallable>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl FrontmatterField {
    /// Create a field with the given name and type.
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            default: None,
            derived: None,
            aliases: Vec::new(),
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the alias list.
    pub fn with_aliases(mut self, aliases: impl IntoIterator<Item = String>) -> Self {
        self.aliases = aliases.into_iter().collect();
        self
    }

    /// Set the derivation callable.
    pub fn with_derived(mut self, derived: SharedCallable) -> Self {
        self.derived = Some(derived);
        self
    }

    /// Check whether a frontmatter key refers to this field (case-insensitive).
    pub fn matches(&self, key: &str) -> bool {
        self.name.eq_ignore_ascii_case(key) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(key))
    }

    /// Resolve this field's value from a note's frontmatter.
    ///
    /// Order: derived callable, then the first matching key, then the default.
    pub fn resolve(
        &self,
        frontmatter: &serde_json::Map<String, Value>,
    ) -> Result<Option<Value>, CallError> {
        if let Some(derived) = &self.derived {
            let value = derived.call(vec![Value::Object(frontmatter.clone())])?;
            return Ok(Some(value));
        }

        let found = frontmatter
            .iter()
            .find(|(key, value)| self.matches(key) && !value.is_null())
            .map(|(_, value)| value.clone());

        Ok(found.or_else(|| self.default.clone()))
    }
}
