//! The canonical system definition handed to the rendering layer.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::entities::{ComputedExpression, EntityDef, ExpressionContext};
use crate::error::CallError;
use crate::mechanics::{AttributeDef, FeatureSet, SpellcastingSet};

/// A validated rules system.
///
/// Immutable by contract once produced: the loader never touches it again and
/// consumers should treat it as read-only.
#[derive(Debug, Clone, Serialize)]
pub struct SystemDefinition {
    pub name: String,

    /// Never empty.
    pub attributes: Vec<AttributeDef>,

    pub entities: BTreeMap<String, EntityDef>,

    pub skills: Vec<Value>,

    /// Expressions of every entity, keyed by id.
    pub expressions: BTreeMap<String, ComputedExpression>,

    pub features: FeatureSet,

    pub spellcasting: SpellcastingSet,

    pub conditions: Vec<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub traits: Option<Value>,

    pub events: Vec<Value>,
}

impl SystemDefinition {
    /// Create a minimal system with defaulted substructures.
    pub fn new(name: impl Into<String>, attributes: Vec<AttributeDef>) -> Self {
        Self {
            name: name.into(),
            attributes,
            entities: BTreeMap::new(),
            skills: Vec::new(),
            expressions: BTreeMap::new(),
            features: FeatureSet::default(),
            spellcasting: SpellcastingSet::default(),
            conditions: Vec::new(),
            traits: None,
            events: Vec::new(),
        }
    }

    /// Get an entity by key.
    pub fn entity(&self, key: &str) -> Option<&EntityDef> {
        self.entities.get(key)
    }

    /// Get an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// All attribute names in declaration order.
    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name.as_str()).collect()
    }

    /// Get a computed expression by id.
    pub fn expression(&self, id: &str) -> Option<&ComputedExpression> {
        self.expressions.get(id)
    }

    /// Evaluate a computed expression by id.
    ///
    /// Returns `Ok(None)` if no expression has that id.
    pub fn evaluate(&self, id: &str, ctx: &ExpressionContext) -> Result<Option<Value>, CallError> {
        match self.expressions.get(id) {
            Some(expr) => expr.evaluate(ctx).map(Some),
            None => Ok(None),
        }
    }
}
