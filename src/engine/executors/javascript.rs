//! JavaScript executor backed by the embedded Boa engine.
//!
//! Boa contexts are not `Send`, so every run builds a fresh context on the
//! blocking thread pool. Compilation only checks the syntax once at startup.

use super::builtins::JAVASCRIPT;
use super::{CompiledScript, ScriptExecutor};
use crate::engine::error::{Result, TransformError};
use crate::engine::variables::Bindings;
use async_trait::async_trait;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsError, JsString, JsValue, Script, Source};
use log::debug;
use serde_json::{Number, Value};
use std::sync::Arc;

/// Largest integer a double represents exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

// Runaway scripts fail instead of pinning a blocking thread
const MAX_LOOP_ITERATIONS: u64 = 10_000_000;
const MAX_RECURSION_DEPTH: usize = 512;

#[derive(Debug, Clone, Default)]
pub struct JavaScriptExecutor;

impl JavaScriptExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl ScriptExecutor for JavaScriptExecutor {
    fn language(&self) -> &str {
        JAVASCRIPT
    }

    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledScript>> {
        let mut context = Context::default();
        Script::parse(Source::from_bytes(source.as_bytes()), None, &mut context).map_err(|e| {
            TransformError::configuration(format!(
                "Failed to compile javascript script: {}",
                error_text(e, &mut context)
            ))
        })?;
        debug!("Compiled javascript script ({} bytes)", source.len());

        Ok(Arc::new(CompiledJavaScript {
            source: Arc::from(source),
        }))
    }
}

struct CompiledJavaScript {
    source: Arc<str>,
}

#[async_trait]
impl CompiledScript for CompiledJavaScript {
    async fn run(&self, bindings: Bindings) -> Result<Value> {
        let source = Arc::clone(&self.source);

        tokio::task::spawn_blocking(move || evaluate(&source, bindings))
            .await
            .map_err(|e| TransformError::Script(format!("javascript runtime task failed: {}", e)))?
    }
}

fn create_context() -> Context {
    let mut context = Context::default();

    let limits = context.runtime_limits_mut();
    limits.set_loop_iteration_limit(MAX_LOOP_ITERATIONS);
    limits.set_recursion_limit(MAX_RECURSION_DEPTH);

    context
}

fn evaluate(source: &str, bindings: Bindings) -> Result<Value> {
    let mut context = create_context();

    for (name, value) in bindings {
        let value = JsValue::from_json(&value, &mut context)
            .map_err(|e| TransformError::Script(error_text(e, &mut context)))?;
        context
            .register_global_property(JsString::from(name.as_str()), value, Attribute::all())
            .map_err(|e| TransformError::Script(error_text(e, &mut context)))?;
    }

    let result = context
        .eval(Source::from_bytes(source.as_bytes()))
        .map_err(|e| TransformError::Script(error_text(e, &mut context)))?;

    to_json(&result, &mut context)
}

fn error_text(error: JsError, context: &mut Context) -> String {
    match error.try_native(context) {
        Ok(native) => native.to_string(),
        Err(_) => error.to_string(),
    }
}

/// Convert a script result into JSON
///
/// Integral numbers come back as integers; `undefined` becomes null.
fn to_json(value: &JsValue, context: &mut Context) -> Result<Value> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(number) = value.as_number() {
        return Ok(number_to_json(number));
    }
    if let Some(flag) = value.as_boolean() {
        return Ok(Value::Bool(flag));
    }
    if let Some(text) = value.as_string() {
        return Ok(Value::String(text.to_std_string_escaped()));
    }

    let json = value
        .to_json(context)
        .map_err(|e| TransformError::Script(error_text(e, context)))?;
    Ok(normalize_numbers(json))
}

fn number_to_json(number: f64) -> Value {
    if !number.is_finite() {
        return Value::Null;
    }
    if number.fract() == 0.0 && number.abs() < MAX_SAFE_INTEGER {
        return Value::from(number as i64);
    }
    Number::from_f64(number).map_or(Value::Null, Value::Number)
}

fn normalize_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => number_to_json(f),
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_numbers(v)))
                .collect(),
        ),
        other => other,
    }
}
