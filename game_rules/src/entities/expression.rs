//! Callables and computed expressions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::CallError;

/// An authored function exposed to the rules model.
///
/// Implementations live in the loader; the model only needs to call them.
pub trait Callable: Send + Sync {
    /// Human-readable name used in error messages.
    fn name(&self) -> &str;

    /// Number of declared parameters, if the implementation can tell.
    fn arity(&self) -> Option<usize>;

    /// Invoke the callable with positional arguments.
    fn call(&self, args: Vec<Value>) -> Result<Value, CallError>;
}

impl fmt::Debug for dyn Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<callable {}>", self.name())
    }
}

/// Shared handle to a callable.
pub type SharedCallable = Arc<dyn Callable>;

/// Context handed to [`ComputedExpression::evaluate`].
///
/// `args` are forwarded positionally, then the whole context is appended as
/// the last argument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpressionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,

    /// Free-form values visible to the expression (usually the note's frontmatter).
    #[serde(flatten)]
    pub values: serde_json::Map<String, Value>,
}

impl ExpressionContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the positional arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args = Some(args.into_iter().collect());
        self
    }

    /// Add a named value.
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

/// An expression derived from an entity's `expressions`/`computed` map.
#[derive(Debug, Clone, Serialize)]
pub struct ComputedExpression {
    pub id: String,
    pub params: Vec<String>,
    pub formula: String,
    #[serde(skip)]
    callable: SharedCallable,
}

impl ComputedExpression {
    /// Build an expression for `entity.id`, deriving the display formula.
    pub fn new(
        entity: &str,
        id: impl Into<String>,
        params: Vec<String>,
        callable: SharedCallable,
    ) -> Self {
        let id = id.into();
        let formula = format!("{}.{}({})", entity, id, params.join(", "));
        Self {
            id,
            params,
            formula,
            callable,
        }
    }

    /// The underlying callable.
    pub fn callable(&self) -> &SharedCallable {
        &self.callable
    }

    /// Evaluate the expression.
    ///
    /// The callable receives `ctx.args` followed by `ctx` itself. When its
    /// arity is known the list is cut or padded with `null` to fit.
    pub fn evaluate(&self, ctx: &ExpressionContext) -> Result<Value, CallError> {
        let mut args = ctx.args.clone().unwrap_or_default();
        args.push(serde_json::to_value(ctx).map_err(|e| CallError::Conversion(e.to_string()))?);

        if let Some(arity) = self.callable.arity() {
            args.resize(arity, Value::Null);
        }

        self.callable.call(args)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Test callable that records its arguments and sums numeric ones.
    pub(crate) struct Recorder {
        pub arity: Option<usize>,
        pub seen: Mutex<Vec<Vec<Value>>>,
    }

    impl Recorder {
        pub(crate) fn new(arity: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                arity,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Callable for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn arity(&self) -> Option<usize> {
            self.arity
        }

        fn call(&self, args: Vec<Value>) -> Result<Value, CallError> {
            let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
            self.seen.lock().unwrap().push(args);
            Ok(json!(sum))
        }
    }

    #[test]
    fn test_formula_format() {
        let expr = ComputedExpression::new(
            "character",
            "attack",
            vec!["str".into(), "dex".into()],
            Recorder::new(Some(2)),
        );
        assert_eq!(expr.formula, "character.attack(str, dex)");

        let expr = ComputedExpression::new("character", "level", vec![], Recorder::new(None));
        assert_eq!(expr.formula, "character.level()");
    }

    #[test]
    fn test_evaluate_fits_known_arity() {
        let recorder = Recorder::new(Some(2));
        let expr = ComputedExpression::new(
            "character",
            "attack",
            vec!["str".into(), "dex".into()],
            recorder.clone(),
        );

        let ctx = ExpressionContext::new().with_args([json!(3), json!(4)]);
        assert_eq!(expr.evaluate(&ctx).unwrap(), json!(7));

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0], vec![json!(3), json!(4)]);
    }

    #[test]
    fn test_evaluate_appends_context() {
        let recorder = Recorder::new(None);
        let expr = ComputedExpression::new("character", "hp", vec![], recorder.clone());

        let ctx = ExpressionContext::new().with_value("level", json!(5));
        expr.evaluate(&ctx).unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 1);
        assert_eq!(seen[0][0]["level"], json!(5));
    }

    #[test]
    fn test_evaluate_pads_missing_args() {
        let recorder = Recorder::new(Some(3));
        let expr = ComputedExpression::new("character", "x", vec![], recorder.clone());

        expr.evaluate(&ExpressionContext::new().with_args([json!(1)]))
            .unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 3);
        assert_eq!(seen[0][2], Value::Null);
    }
}
