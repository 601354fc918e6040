//! The `rules` builder package available to every authored module.

use rhai::{Array, Dynamic, FnPtr, Map, Module, Shared};

use super::script::Deferred;
use super::wiki::Wiki;

/// Name under which the builder package is imported.
pub const BUILDER_PACKAGE: &str = "rules";

/// Render components scripts may place in their blocks.
pub const COMPONENTS: &[&str] = &[
    "header",
    "stat_block",
    "attribute_table",
    "skill_list",
    "feature_list",
    "spell_list",
    "condition_list",
    "xp_progress",
];

/// Build the `rules` package bound to a wiki.
///
/// ```rhai
/// import "rules" as rules;
///
/// let system = rules::system(#{
///     name: "Test",
///     attributes: ["str", "dex"],
///     entities: #{
///         character: rules::entity(#{
///             frontmatter: #{ level: #{ "type": "number", "default": 1 } },
///             blocks: #{ header: |ctx| rules::header(#{ title: ctx.name }) },
///             expressions: #{ attack: rules::expression(["str", "dex"], |a, b| a + b) },
///         }),
///     },
/// });
/// ```
pub fn builder_module(wiki: &Wiki) -> Shared<Module> {
    let mut module = Module::new();
    module.set_id(BUILDER_PACKAGE);

    module.set_native_fn("system", |config: Map| Ok(config));
    module.set_native_fn("system", |factory: FnPtr| Ok(factory));
    module.set_native_fn("entity", |config: Map| Ok(config));
    module.set_native_fn("entity", |factory: FnPtr| Ok(factory));
    module.set_native_fn("expression", |params: Array, evaluate: FnPtr| {
        let mut expression = Map::new();
        expression.insert("params".into(), Dynamic::from_array(params));
        expression.insert("evaluate".into(), Dynamic::from(evaluate));
        Ok(expression)
    });
    module.set_native_fn("defer", |producer: FnPtr| Ok(Deferred(producer)));

    for &component in COMPONENTS {
        module.set_native_fn(component, move |props: Map| Ok(component_node(component, props)));
        module.set_native_fn(component, move || Ok(component_node(component, Map::new())));
    }

    module.set_var("wiki", wiki.clone());
    module.build_index();
    Shared::new(module)
}

fn component_node(component: &str, props: Map) -> Map {
    let mut node = Map::new();
    node.insert("component".into(), Dynamic::from(component.to_string()));
    node.insert("props".into(), Dynamic::from_map(props));
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use rhai::Engine;
    use std::sync::Arc;

    fn engine() -> Engine {
        let wiki = Wiki::new(Arc::new(
            MemorySource::new().with_file("Spells/Light.md", "---\nlevel: 0\n---\n"),
        ));
        let mut engine = Engine::new();
        Wiki::register(&mut engine);
        engine.register_type_with_name::<Deferred>("Deferred");
        engine.register_static_module(BUILDER_PACKAGE, builder_module(&wiki));
        engine
    }

    #[test]
    fn test_expression_declares_params() {
        let expression: Map = engine()
            .eval("rules::expression([\"str\", \"dex\"], |a, b| a + b)")
            .unwrap();
        let params: Vec<String> = expression["params"]
            .clone()
            .into_typed_array::<rhai::ImmutableString>()
            .unwrap()
            .into_iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(params, vec!["str", "dex"]);
        assert!(expression["evaluate"].is_fnptr());
    }

    #[test]
    fn test_components_are_opaque_nodes() {
        let node: Map = engine().eval("rules::stat_block(#{ hp: 7 })").unwrap();
        assert_eq!(node["component"].clone().into_string().unwrap(), "stat_block");

        let bare: Map = engine().eval("rules::xp_progress()").unwrap();
        assert!(bare["props"].is_map());
    }

    #[test]
    fn test_defer_and_wiki() {
        let engine = engine();
        let deferred: Dynamic = engine.eval("rules::defer(|| 1)").unwrap();
        assert!(deferred.is::<Deferred>());

        let level: i64 = engine.eval("rules::wiki.file(\"Light\").level").unwrap();
        assert_eq!(level, 0);
    }
}
