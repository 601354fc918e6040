//! Calling back into evaluated scripts.

use game_rules::{CallError, Callable, SharedCallable};
use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Map, Scope, AST};
use serde_json::Value;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::compiler::Bundle;
use crate::config::BackendProfile;

/// Operations between two wall-clock checks.
const PROGRESS_CHECK_INTERVAL: u64 = 1024;

/// Upper bound on chained deferred values.
const MAX_DEFERRED_CHAIN: usize = 64;

thread_local! {
    static DEADLINE: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// Arms the calling thread's deadline until dropped.
///
/// Nested guards keep the earlier deadline.
struct DeadlineGuard {
    previous: Option<Instant>,
}

impl DeadlineGuard {
    fn start(budget: Option<Duration>) -> Self {
        let previous = DEADLINE.with(Cell::get);
        let next = match (previous, budget.map(|b| Instant::now() + b)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        DEADLINE.with(|d| d.set(next));
        Self { previous }
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        DEADLINE.with(|d| d.set(self.previous));
    }
}

/// Apply a profile's limits and the wall-clock check to an engine.
pub(crate) fn install_limits(engine: &mut Engine, profile: &BackendProfile) {
    profile.apply(engine);
    engine.on_progress(|operations| {
        if operations % PROGRESS_CHECK_INTERVAL != 0 {
            return None;
        }
        match DEADLINE.with(Cell::get) {
            Some(deadline) if Instant::now() >= deadline => {
                Some(Dynamic::from("wall-clock budget exceeded"))
            }
            _ => None,
        }
    });
}

/// A value produced later, created with `rules::defer(|| ...)`.
#[derive(Debug, Clone)]
pub struct Deferred(pub FnPtr);

/// The engine and bundle behind every callable a system hands out.
pub struct ScriptRuntime {
    engine: Engine,
    bundle: Arc<Bundle>,
    /// Script functions of every bundled module, entry functions taking precedence.
    callables: AST,
    functions: HashMap<String, Vec<Vec<String>>>,
    timeout: Option<Duration>,
}

impl ScriptRuntime {
    pub(crate) fn new(engine: Engine, bundle: Arc<Bundle>) -> Self {
        let mut callables = AST::default();
        for (path, ast) in bundle.modules() {
            if path != bundle.entry() {
                callables = callables.merge(&ast.clone_functions_only());
            }
        }
        let callables = callables.merge(&bundle.entry_ast().clone_functions_only());

        let mut functions: HashMap<String, Vec<Vec<String>>> = HashMap::new();
        for (_, ast) in bundle.modules() {
            for function in ast.iter_functions() {
                functions
                    .entry(function.name.to_string())
                    .or_default()
                    .push(function.params.iter().map(|p| p.to_string()).collect());
            }
        }
        let timeout = bundle.profile().timeout();

        Self {
            engine,
            bundle,
            callables,
            functions,
            timeout,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run the entry module, leaving its top-level variables in `scope`.
    pub(crate) fn run_entry(&self, scope: &mut Scope) -> Result<(), Box<EvalAltResult>> {
        let _deadline = DeadlineGuard::start(self.timeout);
        self.engine.run_ast_with_scope(scope, self.bundle.entry_ast())
    }

    /// Parameters a script function pointer declares, captured variables excluded.
    ///
    /// `None` when the pointer does not name a script function (native
    /// functions, unknown names).
    pub fn declared_params(&self, fn_ptr: &FnPtr) -> Option<Vec<String>> {
        let curried = fn_ptr.curry().len();
        self.functions
            .get(fn_ptr.fn_name())?
            .iter()
            .find(|params| params.len() >= curried)
            .map(|params| params[curried..].to_vec())
    }

    /// Call a function pointer, fitting `args` to its declared parameters.
    pub fn call(&self, fn_ptr: &FnPtr, mut args: Vec<Dynamic>) -> Result<Dynamic, Box<EvalAltResult>> {
        if let Some(params) = self.declared_params(fn_ptr) {
            args.resize(params.len(), Dynamic::UNIT);
        }
        let _deadline = DeadlineGuard::start(self.timeout);
        fn_ptr.call::<Dynamic>(&self.engine, &self.callables, args)
    }

    /// Resolve [`Deferred`] values until a plain value remains.
    pub fn force(&self, mut value: Dynamic) -> Result<Dynamic, Box<EvalAltResult>> {
        for _ in 0..MAX_DEFERRED_CHAIN {
            if !value.is::<Deferred>() {
                return Ok(value);
            }
            match value.try_cast::<Deferred>() {
                Some(Deferred(producer)) => value = self.call(&producer, Vec::new())?,
                None => return Err("deferred value vanished".into()),
            }
        }
        Err(format!("deferred chain longer than {}", MAX_DEFERRED_CHAIN).into())
    }

    /// Wrap a function pointer for use by the rules model.
    pub fn callable(self: &Arc<Self>, name: impl Into<String>, fn_ptr: FnPtr) -> SharedCallable {
        let arity = self.declared_params(&fn_ptr).map(|p| p.len());
        Arc::new(ScriptCallable {
            runtime: Arc::clone(self),
            name: name.into(),
            fn_ptr,
            arity,
        })
    }
}

impl std::fmt::Debug for ScriptRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRuntime")
            .field("entry", &self.bundle.entry())
            .field("functions", &self.functions.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A script function pointer seen through [`Callable`].
pub struct ScriptCallable {
    runtime: Arc<ScriptRuntime>,
    name: String,
    fn_ptr: FnPtr,
    arity: Option<usize>,
}

impl Callable for ScriptCallable {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> Option<usize> {
        self.arity
    }

    fn call(&self, args: Vec<Value>) -> Result<Value, CallError> {
        let args = args
            .iter()
            .map(json_to_dynamic)
            .collect::<Result<Vec<_>, _>>()?;

        let result = self
            .runtime
            .call(&self.fn_ptr, args)
            .and_then(|value| self.runtime.force(value))
            .map_err(|e| CallError::Script {
                name: self.name.clone(),
                message: e.to_string(),
            })?;

        Ok(dynamic_to_json(&result))
    }
}

/// Convert a JSON value into a script value.
pub fn json_to_dynamic(value: &Value) -> Result<Dynamic, CallError> {
    rhai::serde::to_dynamic(value).map_err(|e| CallError::Conversion(e.to_string()))
}

/// Convert a script value into JSON.
///
/// Function pointers become `"Fn(name)"`; other opaque values become their
/// type name.
pub fn dynamic_to_json(value: &Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::from(i);
    }
    if let Ok(f) = value.as_float() {
        return serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number);
    }
    if let Ok(c) = value.as_char() {
        return Value::String(c.to_string());
    }
    if let Some(s) = value.read_lock::<ImmutableString>() {
        return Value::String(s.to_string());
    }
    if let Some(array) = value.read_lock::<Array>() {
        return Value::Array(array.iter().map(dynamic_to_json).collect());
    }
    if let Some(map) = value.read_lock::<Map>() {
        return Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), dynamic_to_json(v)))
                .collect(),
        );
    }
    if let Some(fn_ptr) = value.read_lock::<FnPtr>() {
        return Value::String(format!("Fn({})", fn_ptr.fn_name()));
    }
    Value::String(value.type_name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn runtime(text: &str, profile: BackendProfile) -> (Arc<ScriptRuntime>, Scope<'static>) {
        let bundle = Arc::new(Bundle::from_source("test/index.rhai", text, profile.clone()));
        let mut engine = Engine::new();
        install_limits(&mut engine, &profile);
        engine.register_type_with_name::<Deferred>("Deferred");
        engine.register_fn("defer", |f: FnPtr| Deferred(f));

        let runtime = Arc::new(ScriptRuntime::new(engine, bundle));
        let mut scope = Scope::new();
        runtime.run_entry(&mut scope).unwrap();
        (runtime, scope)
    }

    fn fn_ptr(scope: &Scope, name: &str) -> FnPtr {
        scope.get_value::<FnPtr>(name).unwrap()
    }

    #[test]
    fn test_declared_params_skip_captures() {
        let (runtime, scope) = runtime(
            "let bonus = 2;\nlet add = |str, dex| str + dex + bonus;\nlet named = Fn(\"total\");\nfn total(a, b, c) { a + b + c }",
            BackendProfile::default(),
        );

        assert_eq!(
            runtime.declared_params(&fn_ptr(&scope, "add")),
            Some(vec!["str".to_string(), "dex".to_string()])
        );
        assert_eq!(
            runtime.declared_params(&fn_ptr(&scope, "named")),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_native_fn_has_unknown_params() {
        let (runtime, scope) = runtime("let f = Fn(\"abs\");", BackendProfile::default());
        assert_eq!(runtime.declared_params(&fn_ptr(&scope, "f")), None);
    }

    #[test]
    fn test_call_fits_arguments() {
        let (runtime, scope) = runtime("let add = |a, b| a + b;", BackendProfile::default());
        let result = runtime
            .call(
                &fn_ptr(&scope, "add"),
                vec![Dynamic::from(2_i64), Dynamic::from(3_i64), Dynamic::from(9_i64)],
            )
            .unwrap();
        assert_eq!(result.as_int().unwrap(), 5);
    }

    #[test]
    fn test_force_chained_deferred() {
        let (runtime, scope) = runtime(
            "let value = defer(|| defer(|| 42));",
            BackendProfile::default(),
        );
        let value = scope.get_value::<Dynamic>("value").unwrap();
        assert!(value.is::<Deferred>());
        assert_eq!(runtime.force(value).unwrap().as_int().unwrap(), 42);
    }

    #[test]
    fn test_callable_round_trip() {
        let (runtime, scope) = runtime(
            "let header = |ctx| `Level ${ctx.level}`;",
            BackendProfile::default(),
        );
        let header = runtime.callable("header", fn_ptr(&scope, "header"));

        assert_eq!(header.arity(), Some(1));
        assert_eq!(header.call(vec![json!({"level": 3})]).unwrap(), json!("Level 3"));
    }

    #[test]
    fn test_call_error_names_callable() {
        let (runtime, scope) = runtime("let boom = || { throw \"nope\"; };", BackendProfile::default());
        let err = runtime
            .callable("boom", fn_ptr(&scope, "boom"))
            .call(vec![])
            .unwrap_err();
        assert!(err.to_string().contains("`boom`"));
    }

    #[test]
    fn test_wall_clock_budget() {
        let profile = BackendProfile {
            max_operations: 0,
            timeout_ms: 50,
            ..BackendProfile::default()
        };
        let (runtime, scope) = runtime("let spin = || { loop { } };", profile);

        let started = Instant::now();
        assert!(runtime.call(&fn_ptr(&scope, "spin"), vec![]).is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(DEADLINE.with(Cell::get), None);
    }

    #[test]
    fn test_dynamic_to_json() {
        let mut map = Map::new();
        map.insert("n".into(), Dynamic::from(1_i64));
        map.insert("list".into(), Dynamic::from(vec![Dynamic::TRUE, Dynamic::UNIT]));
        map.insert("name".into(), Dynamic::from("str"));

        assert_eq!(
            dynamic_to_json(&Dynamic::from_map(map)),
            json!({"n": 1, "list": [true, null], "name": "str"})
        );
        assert_eq!(
            dynamic_to_json(&Dynamic::from(FnPtr::new("total").unwrap())),
            json!("Fn(total)")
        );
    }
}
