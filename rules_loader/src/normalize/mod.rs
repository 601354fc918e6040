//! Normalization of raw system configuration into a [`SystemDefinition`].
//!
//! The normalizer validates instead of coercing: a missing name, an empty
//! attribute list, or a render block that is not a function fails the whole
//! system.

mod entity;
mod expressions;

pub use entity::DEFAULT_FIELD_TYPE;
pub use expressions::EXPRESSION_KEYS;

use game_rules::{AttributeDef, ConfigurationError, FeatureSet, SpellcastingSet, SystemDefinition};
use rhai::{Array, Dynamic, FnPtr, ImmutableString, Map};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::factories::resolve_entity_factories;
use crate::sandbox::{dynamic_to_json, ScriptRuntime, Wiki};

/// Builds system definitions from the values a bundle exported.
#[derive(Debug, Clone)]
pub struct SystemNormalizer {
    runtime: Arc<ScriptRuntime>,
}

impl SystemNormalizer {
    /// Create a normalizer whose callables run on `runtime`.
    pub fn new(runtime: Arc<ScriptRuntime>) -> Self {
        Self { runtime }
    }

    /// Normalize an exported `system` value: a map or a factory function.
    pub async fn normalize(&self, raw: Dynamic, wiki: &Wiki) -> Result<SystemDefinition, LoadError> {
        let config = self.resolve_raw(raw, wiki).await?;
        Ok(self.build_exported(config)?)
    }

    /// Invoke a system factory with `#{wiki}`, then resolve and build its result.
    pub async fn build_from_factory(
        &self,
        factory: FnPtr,
        wiki: &Wiki,
    ) -> Result<SystemDefinition, LoadError> {
        self.normalize(Dynamic::from(factory), wiki).await
    }

    /// Resolve entity factories in a configuration map, then build.
    pub async fn resolve(&self, config: Map, wiki: &Wiki) -> Result<SystemDefinition, LoadError> {
        let config = resolve_entity_factories(&self.runtime, config, wiki).await?;
        Ok(self.build(&config)?)
    }

    /// Invoke a system factory and resolve every entity factory and deferred
    /// value of the resulting map. Values that are not maps pass through for
    /// [`build_exported`](Self::build_exported) to reject.
    pub async fn resolve_raw(&self, raw: Dynamic, wiki: &Wiki) -> Result<Dynamic, LoadError> {
        let raw = if raw.is_fnptr() {
            match raw.try_cast::<FnPtr>() {
                Some(factory) => self.invoke_factory(factory, wiki).await?,
                None => return Err(LoadError::SystemFactory("factory is not callable".to_string())),
            }
        } else {
            raw
        };

        if !raw.is_map() {
            return Ok(raw);
        }
        match raw.try_cast::<Map>() {
            Some(config) => Ok(Dynamic::from_map(
                resolve_entity_factories(&self.runtime, config, wiki).await?,
            )),
            None => Err(invalid_field("system", "expected a map or a factory").into()),
        }
    }

    async fn invoke_factory(&self, factory: FnPtr, wiki: &Wiki) -> Result<Dynamic, LoadError> {
        let runtime = Arc::clone(&self.runtime);
        let ctx = wiki.context();
        debug!(factory = factory.fn_name(), "invoking system factory");

        tokio::task::spawn_blocking(move || {
            runtime
                .call(&factory, vec![Dynamic::from_map(ctx)])
                .and_then(|value| runtime.force(value))
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| LoadError::SystemFactory(e.to_string()))?
        .map_err(LoadError::SystemFactory)
    }

    /// Validate the resolved export, which must be a map, then build it.
    pub fn build_exported(&self, config: Dynamic) -> Result<SystemDefinition, ConfigurationError> {
        let type_name = config.type_name();
        match config.try_cast::<Map>() {
            Some(config) => self.build(&config),
            None => Err(invalid_field(
                "system",
                format!("expected a map or a factory, got {}", type_name),
            )),
        }
    }

    /// Validate and normalize a fully resolved configuration.
    pub fn build(&self, config: &Map) -> Result<SystemDefinition, ConfigurationError> {
        let name = match config.get("name").filter(|v| !v.is_unit()) {
            Some(name) => string_of(name).ok_or_else(|| invalid_field("name", "expected a string"))?,
            None => return Err(ConfigurationError::MissingField("name")),
        };
        if name.is_empty() {
            return Err(invalid_field("name", "must not be empty"));
        }

        let mut system = SystemDefinition::new(name, attributes(config)?);

        if let Some(entities) = config.get("entities").filter(|v| !v.is_unit()) {
            let entities = entities
                .read_lock::<Map>()
                .ok_or_else(|| invalid_field("entities", "expected a map"))?;
            for (key, value) in entities.iter() {
                let entity_config = value.read_lock::<Map>().ok_or_else(|| {
                    ConfigurationError::invalid_entity(
                        key.as_str(),
                        format!("expected a map, got {}", value.type_name()),
                    )
                })?;

                let entity = entity::entity(&self.runtime, key, &entity_config)?;
                for expression in expressions::entity_expressions(&self.runtime, key, &entity_config)? {
                    let id = expression.id.clone();
                    if let Some(previous) = system.expressions.insert(id.clone(), expression) {
                        warn!(
                            expression = %id,
                            entity = %key,
                            replaced = %previous.formula,
                            "expression id collision, later definition wins"
                        );
                    }
                }
                system.entities.insert(key.to_string(), entity);
            }
        }

        system.skills = list_field(config, "skills")?;
        system.conditions = list_field(config, "conditions")?;
        system.events = list_field(config, "events")?;
        system.features = typed_field::<FeatureSet>(config, "features")?;
        system.spellcasting = typed_field::<SpellcastingSet>(config, "spellcasting")?;
        system.traits = optional_json(config, "traits");

        debug!(
            system = %system.name,
            entities = system.entities.len(),
            expressions = system.expressions.len(),
            "system normalized"
        );
        Ok(system)
    }
}

fn attributes(config: &Map) -> Result<Vec<AttributeDef>, ConfigurationError> {
    let value = config
        .get("attributes")
        .filter(|v| !v.is_unit())
        .ok_or(ConfigurationError::MissingField("attributes"))?;
    let list = value
        .read_lock::<Array>()
        .ok_or_else(|| invalid_field("attributes", "expected a list"))?;
    if list.is_empty() {
        return Err(invalid_field("attributes", "must not be empty"));
    }

    list.iter()
        .enumerate()
        .map(|(i, item)| {
            if let Some(name) = string_of(item) {
                return Ok(AttributeDef::from(name.as_str()));
            }
            let map = item.read_lock::<Map>().ok_or_else(|| {
                invalid_field("attributes", format!("entry {} must be a name or a map", i))
            })?;
            let name = map
                .get("name")
                .and_then(string_of)
                .ok_or_else(|| invalid_field("attributes", format!("entry {} has no `name`", i)))?;
            Ok(map
                .iter()
                .filter(|(key, _)| key.as_str() != "name")
                .fold(AttributeDef::new(name), |attr, (key, value)| {
                    attr.with_metadata(key.as_str(), dynamic_to_json(value))
                }))
        })
        .collect()
}

fn list_field(config: &Map, field: &str) -> Result<Vec<Value>, ConfigurationError> {
    match config.get(field).filter(|v| !v.is_unit()).map(dynamic_to_json) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(invalid_field(field, "expected a list")),
    }
}

fn typed_field<T: DeserializeOwned + Default>(config: &Map, field: &str) -> Result<T, ConfigurationError> {
    match config.get(field).filter(|v| !v.is_unit()).map(dynamic_to_json) {
        None => Ok(T::default()),
        Some(value @ Value::Object(_)) => {
            serde_json::from_value(value).map_err(|e| invalid_field(field, e.to_string()))
        }
        Some(_) => Err(invalid_field(field, "expected a map")),
    }
}

pub(crate) fn optional_json(config: &Map, field: &str) -> Option<Value> {
    config
        .get(field)
        .filter(|v| !v.is_unit())
        .map(dynamic_to_json)
}

pub(crate) fn string_of(value: &Dynamic) -> Option<String> {
    value.read_lock::<ImmutableString>().map(|s| s.to_string())
}

fn invalid_field(field: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidField {
        field: field.to_string(),
        reason: reason.into(),
    }
}
