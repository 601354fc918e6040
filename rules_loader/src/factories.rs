//! Resolution of factory-produced and deferred entity configuration.

use futures::future::join_all;
use rhai::{Dynamic, FnPtr, Map};
use std::sync::Arc;
use tracing::debug;

use crate::error::FactoryResolutionError;
use crate::sandbox::{Deferred, ScriptRuntime, Wiki};

/// Resolve every entry of `config.entities` to a plain value.
///
/// A callable entry is invoked with `#{wiki}`; a deferred entry, bare or
/// returned, is forced until a plain value remains. Every key runs on its own
/// blocking task and all of them finish before the outcome is decided. The
/// first failing key in key order is reported.
pub async fn resolve_entity_factories(
    runtime: &Arc<ScriptRuntime>,
    mut config: Map,
    wiki: &Wiki,
) -> Result<Map, FactoryResolutionError> {
    let Some(entities) = config
        .get("entities")
        .and_then(|entities| entities.read_lock::<Map>().map(|map| (*map).clone()))
    else {
        return Ok(config);
    };

    let tasks = entities.into_iter().map(|(key, value)| {
        let runtime = Arc::clone(runtime);
        let ctx = wiki.context();
        let key = key.to_string();
        async move {
            let task_key = key.clone();
            let outcome = tokio::task::spawn_blocking(move || resolve_entry(&runtime, &task_key, value, ctx))
                .await
                .map_err(|e| e.to_string())
                .and_then(|result| result);
            (key, outcome)
        }
    });

    let mut resolved = Map::new();
    for (key, outcome) in join_all(tasks).await {
        match outcome {
            Ok(value) => {
                resolved.insert(key.into(), value);
            }
            Err(message) => return Err(FactoryResolutionError { key, message }),
        }
    }

    config.insert("entities".into(), Dynamic::from_map(resolved));
    Ok(config)
}

fn resolve_entry(runtime: &ScriptRuntime, key: &str, value: Dynamic, ctx: Map) -> Result<Dynamic, String> {
    let value = if value.is_fnptr() {
        debug!(entity = key, "invoking entity factory");
        match value.try_cast::<FnPtr>() {
            Some(factory) => runtime
                .call(&factory, vec![Dynamic::from_map(ctx)])
                .map_err(|e| e.to_string())?,
            None => return Err("factory is not callable".to_string()),
        }
    } else {
        value
    };

    if value.is::<Deferred>() {
        debug!(entity = key, "forcing deferred entity");
    }
    runtime.force(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, CompilerRuntime};
    use crate::sandbox::{EvaluatedBundle, SandboxEvaluator};
    use crate::source::{ContentSource, MemorySource};

    async fn evaluate(script: &str) -> EvaluatedBundle {
        let source: Arc<dyn ContentSource> = Arc::new(
            MemorySource::new()
                .with_file("sys/index.rhai", script)
                .with_file("Monsters/Goblin.md", "---\nhp: 7\n---\n")
                .with_file("Monsters/Orc.md", "---\nhp: 15\n---\n"),
        );
        let bundle = compile(&CompilerRuntime::new(), "sys/index.rhai", source.clone())
            .await
            .into_result()
            .unwrap();
        SandboxEvaluator::new().try_evaluate(bundle, source).await.unwrap()
    }

    async fn resolve(evaluated: &EvaluatedBundle) -> Result<Map, FactoryResolutionError> {
        let config = evaluated.system.clone().try_cast::<Map>().unwrap();
        resolve_entity_factories(&evaluated.runtime, config, &evaluated.wiki).await
    }

    fn entity(config: &Map, key: &str) -> Map {
        config["entities"].read_lock::<Map>().unwrap()[key]
            .clone()
            .try_cast::<Map>()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_factories_and_deferred_entries() {
        let evaluated = evaluate(
            r#"
            let system = #{
                name: "Test",
                entities: #{
                    plain: #{ lookup: 1 },
                    factory: |ctx| #{ lookup: ctx.wiki.folder("Monsters").len() },
                    deferred: rules::defer(|| #{ lookup: 3 }),
                    nested: || rules::defer(|| rules::defer(|| #{ lookup: 4 })),
                },
            };
            "#,
        )
        .await;

        let config = resolve(&evaluated).await.unwrap();
        for (key, expected) in [("plain", 1), ("factory", 2), ("deferred", 3), ("nested", 4)] {
            assert_eq!(entity(&config, key)["lookup"].as_int().unwrap(), expected, "{key}");
        }
        assert!(config.contains_key("name"));
    }

    #[tokio::test]
    async fn test_first_failing_key_in_order() {
        let evaluated = evaluate(
            r#"
            let system = #{
                entities: #{
                    beta: || { throw "beta broke"; },
                    alpha: rules::defer(|| { throw "alpha broke"; }),
                    gamma: #{},
                },
            };
            "#,
        )
        .await;

        let err = resolve(&evaluated).await.unwrap_err();
        assert_eq!(err.key, "alpha");
        assert!(err.message.contains("alpha broke"));
    }

    #[tokio::test]
    async fn test_missing_entities_untouched() {
        let evaluated = evaluate("let system = #{ name: \"Bare\" };").await;
        let config = resolve(&evaluated).await.unwrap();
        assert!(!config.contains_key("entities"));
    }
}
