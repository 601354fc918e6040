//! System-wide mechanics: attributes, feature and spellcasting sets.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A core attribute (e.g. strength). A bare name is sugar for `{ name }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,

    /// Any extra metadata the author attached (label, description, ...).
    #[serde(flatten)]
    pub metadata: BTreeMap<String, Value>,
}

impl AttributeDef {
    /// Create an attribute with no metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl From<&str> for AttributeDef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Feature categories and providers. Always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    #[serde(default)]
    pub categories: Vec<Value>,

    #[serde(default)]
    pub providers: Vec<Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FeatureSet {
    /// Check whether nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.providers.is_empty() && self.extra.is_empty()
    }
}

/// Spell circles and providers. Always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellcastingSet {
    #[serde(default)]
    pub circles: Vec<Value>,

    #[serde(default)]
    pub providers: Vec<Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SpellcastingSet {
    /// Check whether nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.circles.is_empty() && self.providers.is_empty() && self.extra.is_empty()
    }
}
