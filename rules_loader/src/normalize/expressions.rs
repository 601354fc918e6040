//! Computed expressions and their parameter introspection.

use game_rules::{ComputedExpression, ConfigurationError};
use rhai::{Array, Dynamic, FnPtr, Map};
use std::sync::Arc;

use super::string_of;
use crate::sandbox::ScriptRuntime;

/// Keys an entity may declare expressions under, in merge order.
pub const EXPRESSION_KEYS: [&str; 2] = ["expressions", "computed"];

/// Every expression an entity declares, in merge order.
pub(crate) fn entity_expressions(
    runtime: &Arc<ScriptRuntime>,
    entity: &str,
    config: &Map,
) -> Result<Vec<ComputedExpression>, ConfigurationError> {
    let mut expressions = Vec::new();
    for key in EXPRESSION_KEYS {
        let Some(declared) = config.get(key).filter(|v| !v.is_unit()) else {
            continue;
        };
        let declared = declared.read_lock::<Map>().ok_or_else(|| {
            ConfigurationError::invalid_entity(entity, format!("`{}` must be a map", key))
        })?;
        for (id, value) in declared.iter() {
            expressions.push(expression(runtime, entity, id.as_str(), value)?);
        }
    }
    Ok(expressions)
}

/// Derive one expression from a function or `rules::expression(params, f)`.
fn expression(
    runtime: &Arc<ScriptRuntime>,
    entity: &str,
    id: &str,
    value: &Dynamic,
) -> Result<ComputedExpression, ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidExpression {
        entity: entity.to_string(),
        expression: id.to_string(),
        reason,
    };

    let (fn_ptr, declared) = if let Some(f) = value.read_lock::<FnPtr>() {
        ((*f).clone(), None)
    } else if let Some(map) = value.read_lock::<Map>() {
        let f = map
            .get("evaluate")
            .and_then(|e| e.read_lock::<FnPtr>().map(|f| (*f).clone()))
            .ok_or_else(|| invalid("`evaluate` must be callable".to_string()))?;
        let params = match map.get("params").filter(|v| !v.is_unit()) {
            Some(params) => Some(param_names(params).ok_or_else(|| {
                invalid("`params` must be a list of names".to_string())
            })?),
            None => None,
        };
        (f, params)
    } else {
        return Err(invalid(format!(
            "expected a function or rules::expression(params, f), got {}",
            value.type_name()
        )));
    };

    let params = declared
        .or_else(|| runtime.declared_params(&fn_ptr))
        .unwrap_or_default();
    let callable = runtime.callable(format!("{}.{}", entity, id), fn_ptr);
    Ok(ComputedExpression::new(entity, id, params, callable))
}

fn param_names(value: &Dynamic) -> Option<Vec<String>> {
    value
        .read_lock::<Array>()?
        .iter()
        .map(string_of)
        .collect()
}
