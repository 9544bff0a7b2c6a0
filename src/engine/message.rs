use crate::engine::error::ErrorInfo;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Message headers, exposed to scripts under the `headers` binding
pub type Headers = BTreeMap<String, Value>;

/// The envelope flowing through the transform stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub payload: Arc<Value>,
    #[serde(default)]
    pub headers: Headers,
    /// Errors that occurred while transforming this message
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
}

impl Message {
    pub fn new(payload: Arc<Value>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            payload,
            headers: Headers::new(),
            errors: vec![],
        }
    }

    /// Convenience method for creating a message from a Value reference
    /// Note: This clones the entire Value. Use new() to share an existing Arc.
    pub fn from_value(payload: &Value) -> Self {
        Self::new(Arc::new(payload.clone()))
    }

    /// Add a header, replacing any previous value under the same name
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Headers rendered as a JSON object for script bindings
    pub fn headers_value(&self) -> Value {
        Value::Object(
            self.headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }

    /// Add an error to the message
    pub fn add_error(&mut self, error: ErrorInfo) {
        self.errors.push(error);
    }

    /// Check if message has errors
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
