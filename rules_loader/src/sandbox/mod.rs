//! Sandboxed evaluation of compiled bundles.
//!
//! Each evaluation gets a fresh engine. Imports never touch the filesystem:
//! the require shim serves the `rules` builder package, then bundled modules,
//! then host modules registered by the embedder, and finally an empty module.

mod builder;
mod script;
mod wiki;

pub use builder::*;
pub use script::*;
pub use wiki::*;

use rhai::module_resolvers::ModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Module, Position, Scope, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::compiler::Bundle;
use crate::error::EvaluationError;
use crate::source::ContentSource;

/// Name of the variable the entry module binds its configuration to.
pub const SYSTEM_EXPORT: &str = "system";

/// A bundle that ran to completion.
#[derive(Debug)]
pub struct EvaluatedBundle {
    /// Engine and functions behind every callable in `system`.
    pub runtime: Arc<ScriptRuntime>,
    /// The exported configuration, with a deferred export already forced.
    pub system: Dynamic,
    pub wiki: Wiki,
}

/// Runs bundles in isolated engines.
#[derive(Debug, Clone, Default)]
pub struct SandboxEvaluator {
    host_modules: HashMap<String, Shared<Module>>,
}

impl SandboxEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `module` importable under `name`.
    pub fn with_host_module(mut self, name: impl Into<String>, module: Module) -> Self {
        self.host_modules.insert(name.into(), Shared::new(module));
        self
    }

    /// Evaluate a bundle. Failures are logged and yield `None`.
    pub async fn evaluate(
        &self,
        bundle: Bundle,
        source: Arc<dyn ContentSource>,
    ) -> Option<EvaluatedBundle> {
        let entry = bundle.entry().to_string();
        match self.try_evaluate(bundle, source).await {
            Ok(evaluated) => Some(evaluated),
            Err(e) => {
                warn!(path = %entry, error = %e, "bundle evaluation failed");
                None
            }
        }
    }

    /// Evaluate a bundle, reporting why it failed.
    pub async fn try_evaluate(
        &self,
        bundle: Bundle,
        source: Arc<dyn ContentSource>,
    ) -> Result<EvaluatedBundle, EvaluationError> {
        let bundle = Arc::new(bundle);
        let wiki = Wiki::new(source);
        let host_modules = self.host_modules.clone();

        tokio::task::spawn_blocking(move || run_bundle(bundle, wiki, host_modules))
            .await
            .map_err(|e| EvaluationError::Task(e.to_string()))?
    }
}

fn run_bundle(
    bundle: Arc<Bundle>,
    wiki: Wiki,
    host_modules: HashMap<String, Shared<Module>>,
) -> Result<EvaluatedBundle, EvaluationError> {
    let builder = builder_module(&wiki);

    let mut engine = Engine::new();
    install_limits(&mut engine, bundle.profile());
    engine.disable_symbol("eval");
    engine.on_print(|text| info!(target: "rules_script", "{}", text));
    engine.on_debug(|text, source, pos| {
        debug!(target: "rules_script", source = source.unwrap_or_default(), line = pos.line(), "{}", text)
    });
    Wiki::register(&mut engine);
    engine.register_type_with_name::<Deferred>("Deferred");
    engine.register_static_module(BUILDER_PACKAGE, builder.clone());
    engine.set_module_resolver(RequireShim {
        bundle: bundle.clone(),
        builder,
        host_modules,
        wiki: wiki.clone(),
        evaluated: Mutex::default(),
        in_progress: Mutex::default(),
    });

    let runtime = Arc::new(ScriptRuntime::new(engine, bundle));
    let mut scope = Scope::new();
    scope.push_constant("wiki", wiki.clone());
    runtime
        .run_entry(&mut scope)
        .map_err(|e| EvaluationError::Script(e.to_string()))?;

    let system = scope
        .get_value::<Dynamic>(SYSTEM_EXPORT)
        .filter(|value| !value.is_unit())
        .ok_or(EvaluationError::MissingExport)?;
    let system = runtime
        .force(system)
        .map_err(|e| EvaluationError::Deferred(e.to_string()))?;

    Ok(EvaluatedBundle {
        runtime,
        system,
        wiki,
    })
}

/// Module resolver used inside the sandbox.
struct RequireShim {
    bundle: Arc<Bundle>,
    builder: Shared<Module>,
    host_modules: HashMap<String, Shared<Module>>,
    wiki: Wiki,
    evaluated: Mutex<HashMap<String, Shared<Module>>>,
    in_progress: Mutex<HashSet<String>>,
}

impl RequireShim {
    fn bundled(
        &self,
        engine: &Engine,
        path: &str,
        pos: Position,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        if let Some(module) = lock(&self.evaluated).get(path) {
            return Ok(module.clone());
        }
        if !lock(&self.in_progress).insert(path.to_string()) {
            return Err(EvalAltResult::ErrorInModule(path.to_string(), "cyclic import".into(), pos).into());
        }

        let result = self.evaluate_module(engine, path);
        lock(&self.in_progress).remove(path);

        let module = result
            .map_err(|e| Box::new(EvalAltResult::ErrorInModule(path.to_string(), e, pos)))?;
        lock(&self.evaluated).insert(path.to_string(), module.clone());
        Ok(module)
    }

    fn evaluate_module(&self, engine: &Engine, path: &str) -> Result<Shared<Module>, Box<EvalAltResult>> {
        let ast = self
            .bundle
            .module(path)
            .ok_or_else(|| EvalAltResult::ErrorModuleNotFound(path.to_string(), Position::NONE))?;

        let mut scope = Scope::new();
        scope.push_constant("wiki", self.wiki.clone());
        debug!(%path, "evaluating bundled module");
        Ok(Shared::new(Module::eval_ast_as_new(scope, ast, engine)?))
    }
}

impl ModuleResolver for RequireShim {
    fn resolve(
        &self,
        engine: &Engine,
        source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        if path == BUILDER_PACKAGE {
            return Ok(self.builder.clone());
        }
        if let Some(target) = source.and_then(|importer| self.bundle.link(importer, path)) {
            return self.bundled(engine, target, pos);
        }
        if let Some(module) = self.host_modules.get(path) {
            return Ok(module.clone());
        }

        warn!(
            specifier = path,
            importer = source.unwrap_or_default(),
            "unknown module, substituting an empty one"
        );
        Ok(Shared::new(Module::new()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, CompilerRuntime};
    use crate::source::MemorySource;

    async fn evaluate(source: MemorySource) -> Result<EvaluatedBundle, EvaluationError> {
        evaluate_with(SandboxEvaluator::new(), source).await
    }

    async fn evaluate_with(
        evaluator: SandboxEvaluator,
        source: MemorySource,
    ) -> Result<EvaluatedBundle, EvaluationError> {
        let source: Arc<dyn ContentSource> = Arc::new(source);
        let bundle = compile(&CompilerRuntime::new(), "sys/index.rhai", source.clone())
            .await
            .into_result()
            .unwrap();
        evaluator.try_evaluate(bundle, source).await
    }

    fn name_of(evaluated: &EvaluatedBundle) -> String {
        evaluated.system.read_lock::<rhai::Map>().unwrap()["name"]
            .clone()
            .into_string()
            .unwrap()
    }

    #[tokio::test]
    async fn test_exports_system_map() {
        let source = MemorySource::new().with_file(
            "sys/index.rhai",
            "import \"rules\" as rules;\nlet system = rules::system(#{ name: \"Test\", attributes: [\"str\"] });",
        );

        let evaluated = evaluate(source).await.unwrap();
        assert_eq!(name_of(&evaluated), "Test");
    }

    #[tokio::test]
    async fn test_bundled_modules_and_wiki() {
        let source = MemorySource::new()
            .with_file(
                "sys/index.rhai",
                "import \"./lib/names\" as names;\nlet system = #{ name: names::title };",
            )
            .with_file(
                "sys/lib/names.rhai",
                "import \"../shared\" as shared;\nexport const title = `${shared::prefix} ${wiki.file(\"Lore\").era}`;",
            )
            .with_file("sys/shared.rhai", "export const prefix = \"Age of\";")
            .with_file("Lore.md", "---\nera: Dragons\n---\n");

        let evaluated = evaluate(source).await.unwrap();
        assert_eq!(name_of(&evaluated), "Age of Dragons");
    }

    #[tokio::test]
    async fn test_missing_export() {
        let source = MemorySource::new().with_file("sys/index.rhai", "let config = #{};");
        assert!(matches!(
            evaluate(source).await.unwrap_err(),
            EvaluationError::MissingExport
        ));
    }

    #[tokio::test]
    async fn test_thrown_error() {
        let source = MemorySource::new().with_file("sys/index.rhai", "throw \"bad rules\";\nlet system = 1;");
        let err = evaluate(source).await.unwrap_err();
        assert!(matches!(err, EvaluationError::Script(ref m) if m.contains("bad rules")));
    }

    #[tokio::test]
    async fn test_deferred_export_is_forced() {
        let source = MemorySource::new().with_file(
            "sys/index.rhai",
            "import \"rules\" as rules;\nlet system = rules::defer(|| #{ name: \"Later\" });",
        );
        assert_eq!(name_of(&evaluate(source).await.unwrap()), "Later");
    }

    #[tokio::test]
    async fn test_failed_deferred_export() {
        let source = MemorySource::new().with_file(
            "sys/index.rhai",
            "let system = rules::defer(|| { throw \"no data\"; });",
        );
        assert!(matches!(
            evaluate(source).await.unwrap_err(),
            EvaluationError::Deferred(_)
        ));
    }

    #[tokio::test]
    async fn test_unknown_import_is_empty() {
        let source = MemorySource::new().with_file(
            "sys/index.rhai",
            "import \"obsidian\" as obsidian;\nlet system = #{ name: \"Still\" };",
        );
        assert_eq!(name_of(&evaluate(source).await.unwrap()), "Still");
    }

    #[tokio::test]
    async fn test_host_module() {
        let mut host = Module::new();
        host.set_var("edition", "5e".to_string());
        let evaluator = SandboxEvaluator::new().with_host_module("host", host);

        let source = MemorySource::new().with_file(
            "sys/index.rhai",
            "import \"host\" as host;\nlet system = #{ name: host::edition };",
        );
        assert_eq!(name_of(&evaluate_with(evaluator, source).await.unwrap()), "5e");
    }

    #[tokio::test]
    async fn test_eval_is_disabled() {
        let source = MemorySource::new().with_file("sys/index.rhai", "let system = 1;");
        let evaluated = evaluate(source).await.unwrap();
        assert!(evaluated
            .runtime
            .engine()
            .eval::<i64>("eval(\"1\")")
            .is_err());
    }
}
