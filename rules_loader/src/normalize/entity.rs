//! Entity normalization: front matter, render blocks, pass-through data.

use game_rules::{ConfigurationError, EntityDef, FrontmatterField};
use rhai::{Dynamic, FnPtr, ImmutableString, Map};
use serde_json::Value;
use std::sync::Arc;

use super::{optional_json, string_of};
use crate::frontmatter::normalize_aliases;
use crate::sandbox::{dynamic_to_json, ScriptRuntime};

/// Field type used when a definition omits one.
pub const DEFAULT_FIELD_TYPE: &str = "string";

pub(crate) fn entity(
    runtime: &Arc<ScriptRuntime>,
    key: &str,
    config: &Map,
) -> Result<EntityDef, ConfigurationError> {
    let mut entity = EntityDef::new();

    if let Some(frontmatter) = config.get("frontmatter").filter(|v| !v.is_unit()) {
        entity.frontmatter = frontmatter_fields(runtime, key, frontmatter)?;
    }

    if let Some(blocks) = config.get("blocks").filter(|v| !v.is_unit()) {
        let blocks = blocks
            .read_lock::<Map>()
            .ok_or_else(|| ConfigurationError::invalid_entity(key, "`blocks` must be a map"))?;
        for (name, block) in blocks.iter() {
            let fn_ptr = block
                .read_lock::<FnPtr>()
                .map(|f| (*f).clone())
                .ok_or_else(|| ConfigurationError::BlockNotCallable {
                    entity: key.to_string(),
                    block: name.to_string(),
                })?;
            entity.blocks.insert(
                name.to_string(),
                runtime.callable(format!("{}.{}", key, name), fn_ptr),
            );
        }
    }

    entity.features = optional_json(config, "features");
    entity.xp_table = optional_json(config, "xpTable");
    entity.lookup = optional_json(config, "lookup");
    Ok(entity)
}

/// Front matter in array form (`[#{name, ...}]`) or map form (`#{name: ...}`).
fn frontmatter_fields(
    runtime: &Arc<ScriptRuntime>,
    entity: &str,
    value: &Dynamic,
) -> Result<Vec<FrontmatterField>, ConfigurationError> {
    if let Some(map) = value.read_lock::<Map>() {
        return map
            .iter()
            .map(|(name, def)| field(runtime, entity, name.to_string(), def))
            .collect();
    }

    if let Some(array) = value.read_lock::<rhai::Array>() {
        return array
            .iter()
            .enumerate()
            .map(|(i, def)| {
                let name = def
                    .read_lock::<Map>()
                    .and_then(|m| m.get("name").and_then(string_of))
                    .ok_or_else(|| ConfigurationError::InvalidFrontmatter {
                        entity: entity.to_string(),
                        field: format!("#{}", i),
                        reason: "array entries need a `name`".to_string(),
                    })?;
                field(runtime, entity, name, def)
            })
            .collect();
    }

    Err(ConfigurationError::invalid_entity(
        entity,
        "`frontmatter` must be a map or an array",
    ))
}

fn field(
    runtime: &Arc<ScriptRuntime>,
    entity: &str,
    name: String,
    def: &Dynamic,
) -> Result<FrontmatterField, ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidFrontmatter {
        entity: entity.to_string(),
        field: name.clone(),
        reason: reason.to_string(),
    };

    if let Some(field_type) = def.read_lock::<ImmutableString>() {
        return Ok(FrontmatterField::new(name.clone(), field_type.as_str()));
    }

    let map = def
        .read_lock::<Map>()
        .ok_or_else(|| invalid("expected a type name or a field map"))?;

    let field_type = match map.get("type").filter(|v| !v.is_unit()) {
        Some(t) => string_of(t).ok_or_else(|| invalid("`type` must be a string"))?,
        None => DEFAULT_FIELD_TYPE.to_string(),
    };
    let mut field = FrontmatterField::new(name.clone(), field_type);

    if let Some(default) = map.get("default").filter(|v| !v.is_unit()) {
        field = field.with_default(dynamic_to_json(default));
    }

    if let Some(derived) = map.get("derived").filter(|v| !v.is_unit()) {
        let fn_ptr = derived
            .read_lock::<FnPtr>()
            .map(|f| (*f).clone())
            .ok_or_else(|| invalid("`derived` must be callable"))?;
        field = field.with_derived(runtime.callable(format!("{}.{}", entity, name), fn_ptr));
    }

    for key in ["aliases", "alias"] {
        if let Some(aliases) = map.get(key).filter(|v| !v.is_unit()) {
            match dynamic_to_json(aliases) {
                value @ (Value::Array(_) | Value::String(_)) => {
                    field = field.with_aliases(normalize_aliases(&value));
                }
                _ => return Err(invalid("`aliases` must be a list or a string")),
            }
        }
    }

    Ok(field)
}
