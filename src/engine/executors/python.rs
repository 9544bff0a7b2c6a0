//! Python executor on an embedded interpreter.
//!
//! Only available with the `python` feature. The script is parsed and
//! compiled to code objects once; each run executes them against a fresh
//! globals dict built from the bindings.
//!
//! The result is the value of a trailing expression statement, or the
//! variable named by a trailing single-name assignment, or `None`.

use super::builtins::PYTHON;
use super::{CompiledScript, ScriptExecutor};
use crate::engine::error::{Result, TransformError};
use crate::engine::variables::Bindings;
use async_trait::async_trait;
use log::debug;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyList, PyLong, PyModule, PyString, PyTuple};
use serde_json::{Number, Value};
use std::sync::Arc;

const EMBEDDED_HELPER: &str = include_str!("drivers/python_embedded.py");

#[derive(Debug, Clone, Default)]
pub struct PythonExecutor;

impl PythonExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl ScriptExecutor for PythonExecutor {
    fn language(&self) -> &str {
        PYTHON
    }

    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledScript>> {
        let compiled = Python::with_gil(|py| -> Result<CompiledPython> {
            let helper =
                PyModule::from_code(py, EMBEDDED_HELPER, "script_helper.py", "script_helper")
                    .map_err(|e| {
                        TransformError::configuration(format!(
                            "Failed to load python helper: {}",
                            e
                        ))
                    })?;

            let prepared = helper
                .getattr("prepare")
                .and_then(|prepare| prepare.call1((source,)))
                .map_err(|e| {
                    TransformError::configuration(format!(
                        "Failed to compile python script: {}",
                        e
                    ))
                })?;
            let run = helper.getattr("run").map_err(|e| {
                TransformError::configuration(format!("Failed to load python helper: {}", e))
            })?;

            Ok(CompiledPython {
                prepared: prepared.into(),
                run: run.into(),
            })
        })?;
        debug!("Compiled python script ({} bytes)", source.len());

        Ok(Arc::new(EmbeddedPythonScript {
            compiled: Arc::new(compiled),
        }))
    }
}

struct CompiledPython {
    prepared: PyObject,
    run: PyObject,
}

impl CompiledPython {
    fn call(&self, py: Python<'_>, bindings: &Bindings) -> Result<Value> {
        let scope = PyDict::new(py);
        for (name, value) in bindings {
            let value = json_to_py(py, value).map_err(script_error)?;
            scope.set_item(name, value).map_err(script_error)?;
        }

        let result = self
            .run
            .as_ref(py)
            .call1((self.prepared.as_ref(py), scope))
            .map_err(script_error)?;

        py_to_json(result)
    }
}

struct EmbeddedPythonScript {
    compiled: Arc<CompiledPython>,
}

#[async_trait]
impl CompiledScript for EmbeddedPythonScript {
    async fn run(&self, bindings: Bindings) -> Result<Value> {
        let compiled = Arc::clone(&self.compiled);

        tokio::task::spawn_blocking(move || Python::with_gil(|py| compiled.call(py, &bindings)))
            .await
            .map_err(|e| TransformError::Script(format!("python runtime task failed: {}", e)))?
    }
}

fn script_error(err: PyErr) -> TransformError {
    TransformError::Script(err.to_string())
}

/// Convert a JSON value into a Python object
fn json_to_py(py: Python<'_>, value: &Value) -> PyResult<PyObject> {
    Ok(match value {
        Value::Null => py.None(),
        Value::Bool(b) => b.into_py(py),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into_py(py)
            } else if let Some(u) = n.as_u64() {
                u.into_py(py)
            } else {
                n.as_f64().unwrap_or(f64::NAN).into_py(py)
            }
        }
        Value::String(s) => s.into_py(py),
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| json_to_py(py, item))
                .collect::<PyResult<Vec<_>>>()?;
            PyList::new(py, items).into()
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (key, item) in map {
                dict.set_item(key, json_to_py(py, item)?)?;
            }
            dict.into()
        }
    })
}

/// Convert a Python object into JSON
///
/// Dicts, lists, tuples and scalars map structurally. Integers that do not
/// fit 64 bits and other objects fall back to their `str()`.
fn py_to_json(obj: &PyAny) -> Result<Value> {
    if obj.is_none() {
        return Ok(Value::Null);
    }
    // bool is a subclass of int
    if let Ok(flag) = obj.downcast::<PyBool>() {
        return Ok(Value::Bool(flag.is_true()));
    }
    if obj.downcast::<PyLong>().is_ok() {
        if let Ok(i) = obj.extract::<i64>() {
            return Ok(Value::from(i));
        }
        if let Ok(u) = obj.extract::<u64>() {
            return Ok(Value::from(u));
        }
    }
    if let Ok(float) = obj.downcast::<PyFloat>() {
        return Number::from_f64(float.value())
            .map(Value::Number)
            .ok_or_else(|| {
                TransformError::Script(format!(
                    "python result {} is not representable in JSON",
                    float.value()
                ))
            });
    }
    if let Ok(text) = obj.downcast::<PyString>() {
        return Ok(Value::String(text.to_str().map_err(script_error)?.to_string()));
    }
    if let Ok(dict) = obj.downcast::<PyDict>() {
        let mut map = serde_json::Map::new();
        for (key, item) in dict.iter() {
            let key = match key.downcast::<PyString>() {
                Ok(text) => text.to_str().map_err(script_error)?.to_string(),
                Err(_) => key.str().map_err(script_error)?.to_string(),
            };
            map.insert(key, py_to_json(item)?);
        }
        return Ok(Value::Object(map));
    }
    if let Ok(list) = obj.downcast::<PyList>() {
        return list.iter().map(py_to_json).collect::<Result<Vec<_>>>().map(Value::Array);
    }
    if let Ok(tuple) = obj.downcast::<PyTuple>() {
        return tuple.iter().map(py_to_json).collect::<Result<Vec<_>>>().map(Value::Array);
    }

    let text = obj.str().map_err(script_error)?;
    Ok(Value::String(text.to_string()))
}
