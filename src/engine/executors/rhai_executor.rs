use super::builtins::RHAI;
use super::{CompiledScript, ScriptExecutor};
use crate::engine::error::{Result, TransformError};
use crate::engine::variables::Bindings;
use async_trait::async_trait;
use log::debug;
use rhai::{AST, Dynamic, Engine, OptimizationLevel, Scope};
use serde_json::Value;
use std::sync::Arc;

/// Embedded Rhai executor
///
/// The engine is shared by every script it compiles. Scripts run with
/// resource limits so a runaway script fails instead of hanging the stage.
#[derive(Clone)]
pub struct RhaiExecutor {
    engine: Arc<Engine>,
}

impl RhaiExecutor {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(Self::create_engine()),
        }
    }

    fn create_engine() -> Engine {
        let mut engine = Engine::new();

        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(64);
        engine.set_max_operations(10_000_000);
        engine.set_max_string_size(10 * 1024 * 1024);
        engine.set_max_array_size(100_000);
        engine.set_max_map_size(100_000);
        engine.set_optimization_level(OptimizationLevel::Full);

        engine
    }
}

impl Default for RhaiExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptExecutor for RhaiExecutor {
    fn language(&self) -> &str {
        RHAI
    }

    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledScript>> {
        let ast = self.engine.compile(source).map_err(|e| {
            TransformError::configuration(format!("Failed to compile rhai script: {}", e))
        })?;
        debug!("Compiled rhai script ({} bytes)", source.len());

        Ok(Arc::new(CompiledRhai {
            engine: Arc::clone(&self.engine),
            ast: Arc::new(ast),
        }))
    }
}

struct CompiledRhai {
    engine: Arc<Engine>,
    ast: Arc<AST>,
}

#[async_trait]
impl CompiledScript for CompiledRhai {
    async fn run(&self, bindings: Bindings) -> Result<Value> {
        let engine = Arc::clone(&self.engine);
        let ast = Arc::clone(&self.ast);

        tokio::task::spawn_blocking(move || evaluate(&engine, &ast, bindings))
            .await
            .map_err(|e| TransformError::Script(format!("rhai runtime task failed: {}", e)))?
    }
}

fn evaluate(engine: &Engine, ast: &AST, bindings: Bindings) -> Result<Value> {
    let mut scope = Scope::new();
    for (name, value) in bindings {
        let value = rhai::serde::to_dynamic(&value)
            .map_err(|e| TransformError::Script(format!("Cannot bind '{}': {}", name, e)))?;
        scope.push_dynamic(name, value);
    }

    let result = engine
        .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
        .map_err(|e| TransformError::Script(e.to_string()))?;

    if result.is_unit() {
        return Ok(Value::Null);
    }
    rhai::serde::from_dynamic::<Value>(&result)
        .map_err(|e| TransformError::Script(format!("Cannot convert rhai result: {}", e)))
}
