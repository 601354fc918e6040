//! Entity definitions: the note types a rules system knows how to render.

mod expression;
mod frontmatter;

pub use expression::*;
pub use frontmatter::*;

#[cfg(test)]
pub(crate) use expression::tests as expression_test_support;

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::CallError;

/// A normalized entity (e.g. `character`, `monster`, `spell`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityDef {
    pub frontmatter: Vec<FrontmatterField>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Value>,

    /// Render blocks by name. Every entry is validated to be callable.
    #[serde(serialize_with = "serialize_block_names")]
    pub blocks: BTreeMap<String, SharedCallable>,

    #[serde(rename = "xpTable", skip_serializing_if = "Option::is_none")]
    pub xp_table: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup: Option<Value>,
}

impl EntityDef {
    /// Create an empty entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a frontmatter field by name or alias.
    pub fn field(&self, key: &str) -> Option<&FrontmatterField> {
        self.frontmatter.iter().find(|f| f.matches(key))
    }

    /// Get a render block by name.
    pub fn block(&self, name: &str) -> Option<&SharedCallable> {
        self.blocks.get(name)
    }

    /// Names of all render blocks, sorted.
    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    /// Invoke a render block with the given props.
    ///
    /// Returns `Ok(None)` if the entity has no such block.
    pub fn render_block(&self, name: &str, props: Value) -> Result<Option<Value>, CallError> {
        match self.blocks.get(name) {
            Some(block) => block.call(vec![props]).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve every declared field against a note's frontmatter.
    pub fn resolve_frontmatter(
        &self,
        frontmatter: &serde_json::Map<String, Value>,
    ) -> Result<BTreeMap<String, Value>, CallError> {
        let mut resolved = BTreeMap::new();
        for field in &self.frontmatter {
            if let Some(value) = field.resolve(frontmatter)? {
                resolved.insert(field.name.clone(), value);
            }
        }
        Ok(resolved)
    }
}

fn serialize_block_names<S: Serializer>(
    blocks: &BTreeMap<String, SharedCallable>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(blocks.keys())
}

#[cfg(test)]
mod tests {
    use super::expression::tests::Recorder;
    use super::*;
    use serde_json::json;

    fn character() -> EntityDef {
        let mut entity = EntityDef::new();
        entity.frontmatter = vec![
            FrontmatterField::new("level", "number").with_default(json!(1)),
            FrontmatterField::new("class", "string").with_aliases(vec!["role".to_string()]),
        ];
        entity.blocks.insert("header".into(), Recorder::new(Some(1)));
        entity
    }

    #[test]
    fn test_field_lookup() {
        let entity = character();
        assert_eq!(entity.field("level").unwrap().field_type, "number");
        assert_eq!(entity.field("role").unwrap().name, "class");
        assert!(entity.field("missing").is_none());
    }

    #[test]
    fn test_render_block() {
        let entity = character();
        assert_eq!(entity.render_block("header", json!(3)).unwrap(), Some(json!(3)));
        assert!(entity.render_block("footer", json!(null)).unwrap().is_none());
        assert_eq!(entity.block_names().collect::<Vec<_>>(), vec!["header"]);
    }

    #[test]
    fn test_resolve_frontmatter() {
        let entity = character();
        let fm = json!({ "role": "Wizard" });
        let resolved = entity.resolve_frontmatter(fm.as_object().unwrap()).unwrap();

        assert_eq!(resolved["level"], json!(1));
        assert_eq!(resolved["class"], json!("Wizard"));
    }

    #[test]
    fn test_serialize_lists_block_names() {
        let value = serde_json::to_value(character()).unwrap();
        assert_eq!(value["blocks"], json!(["header"]));
        assert_eq!(value["frontmatter"][0]["type"], json!("number"));
    }
}
