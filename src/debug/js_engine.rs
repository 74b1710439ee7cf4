//! JavaScript evaluation engine using boa_engine
//!
//! Evaluates watch expressions and breakpoint conditions against a step's
//! `{input, output, variables, node, error}` scope. Expressions may use the
//! engine's `{{ ... }}` template form and the `$json`, `$input` and `$node`
//! aliases.

use boa_engine::{Context, JsValue, Source};
use serde::Serialize;
use serde_json::Value;

/// Data visible to an expression
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpressionScope {
    pub input: Value,
    pub output: Value,
    pub variables: Value,
    pub node: Value,
    /// Message of a failed step, null otherwise
    pub error: Value,
}

/// Iterations a single loop may run before evaluation fails
const LOOP_ITERATION_LIMIT: u64 = 100_000;
const RECURSION_LIMIT: usize = 256;

/// JavaScript evaluation engine
pub struct JsEngine {
    context: Context,
}

impl JsEngine {
    /// Create a new JavaScript engine instance
    pub fn new() -> Self {
        let mut context = Context::default();
        let limits = context.runtime_limits_mut();
        limits.set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
        limits.set_recursion_limit(RECURSION_LIMIT);
        Self { context }
    }

    /// Define the scope as globals
    pub fn bind_scope(&mut self, scope: &ExpressionScope) -> Result<(), String> {
        let bindings = [
            ("input", &scope.input),
            ("output", &scope.output),
            ("variables", &scope.variables),
            ("node", &scope.node),
            ("error", &scope.error),
            ("$input", &scope.input),
            ("$json", &scope.output),
            ("$node", &scope.variables),
        ];
        for (name, value) in bindings {
            let literal = serde_json::to_string(value).map_err(|e| e.to_string())?;
            let js_code = format!("var {} = {};", name, literal);
            self.context
                .eval(Source::from_bytes(&js_code))
                .map_err(|e| format!("JavaScript error: {}", e))?;
        }
        Ok(())
    }

    /// Evaluate an expression and convert the result to JSON
    pub fn eval(&mut self, expression: &str) -> Result<Value, String> {
        let code = format!("JSON.stringify(({}))", strip_template(expression));
        let result = self
            .context
            .eval(Source::from_bytes(&code))
            .map_err(|e| format!("JavaScript error: {}", e))?;
        js_json_to_value(&result)
    }

    /// Evaluate an expression and return its truthiness
    pub fn eval_bool(&mut self, expression: &str) -> Result<bool, String> {
        let code = format!("({})", strip_template(expression));
        match self.context.eval(Source::from_bytes(&code)) {
            Ok(result) => Ok(result.to_boolean()),
            Err(e) => Err(format!("JavaScript error: {}", e)),
        }
    }
}

impl Default for JsEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate `expression` in a fresh context bound to `scope`
pub fn evaluate(expression: &str, scope: &ExpressionScope) -> Result<Value, String> {
    let mut engine = JsEngine::new();
    engine.bind_scope(scope)?;
    engine.eval(expression)
}

/// Evaluate a condition in a fresh context bound to `scope`
pub fn evaluate_condition(expression: &str, scope: &ExpressionScope) -> Result<bool, String> {
    let mut engine = JsEngine::new();
    engine.bind_scope(scope)?;
    engine.eval_bool(expression)
}

fn strip_template(expression: &str) -> &str {
    let trimmed = expression.trim();
    trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// `JSON.stringify` yields undefined for functions and undefined itself
fn js_json_to_value(value: &JsValue) -> Result<Value, String> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    match value.as_string() {
        Some(s) => serde_json::from_str(&s.to_std_string_escaped()).map_err(|e| e.to_string()),
        None => Err(format!("unexpected JavaScript value: {:?}", value)),
    }
}
