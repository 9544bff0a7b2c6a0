//! # Script Transform Module
//!
//! The [`ScriptTransformer`] is the per-message half of the stage. It is
//! built once from a [`ResolvedScript`], an [`ExecutorRegistry`] and a
//! [`VariableGenerator`]; afterwards it is immutable and can be shared via
//! `Arc` between any number of concurrent workers.

use crate::engine::config::ScriptTransformProperties;
use crate::engine::error::{ErrorInfo, Result, TransformError};
use crate::engine::executors::{CompiledScript, ExecutorRegistry};
use crate::engine::message::Message;
use crate::engine::resolver::{ResolvedScript, ScriptSourceResolver};
use crate::engine::validator::PropertiesValidator;
use crate::engine::variables::{Bindings, StaticVariableGenerator, VariableGenerator};
use log::{debug, error, info};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Binding name of the message payload
pub const PAYLOAD_BINDING: &str = "payload";
/// Binding name of the message headers
pub const HEADERS_BINDING: &str = "headers";

/// Runs one resolved script against message payloads
pub struct ScriptTransformer {
    script: ResolvedScript,
    compiled: Arc<dyn CompiledScript>,
    variables: Arc<dyn VariableGenerator>,
    timeout: Option<Duration>,
}

impl fmt::Debug for ScriptTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptTransformer")
            .field("language", &self.script.language)
            .field("origin", &self.script.origin)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ScriptTransformer {
    /// Bind a resolved script to its executor and compile it
    ///
    /// # Errors
    /// A `Configuration` error when no executor is registered for the
    /// script's language or when the script does not compile.
    pub fn new(
        script: ResolvedScript,
        registry: &ExecutorRegistry,
        variables: Arc<dyn VariableGenerator>,
    ) -> Result<Self> {
        let executor = registry.get(&script.language).ok_or_else(|| {
            error!("No script executor registered for language '{}'", script.language);
            TransformError::configuration(format!(
                "No script executor registered for language '{}'",
                script.language
            ))
        })?;

        let compiled = executor.compile(&script.source)?;
        info!(
            "Created {} script transformer from {}",
            script.language, script.origin
        );

        Ok(Self {
            script,
            compiled,
            variables,
            timeout: None,
        })
    }

    /// Validate, resolve and construct from configuration properties
    pub fn from_properties(
        config: &ScriptTransformProperties,
        registry: &ExecutorRegistry,
    ) -> Result<Self> {
        PropertiesValidator::ensure_valid(config)?;
        let script = ScriptSourceResolver::resolve(config)?;
        let variables = StaticVariableGenerator::from_properties(
            config.variables.as_deref(),
            config.variables_location.as_deref(),
        )?;

        Self::new(script, registry, Arc::new(variables))
    }

    /// Bound each run in [`process_message`](Self::process_message)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn language(&self) -> &str {
        &self.script.language
    }

    pub fn script(&self) -> &ResolvedScript {
        &self.script
    }

    /// Bindings for one run: generated variables, then `payload` and
    /// `headers` on top
    pub fn bindings_for(&self, message: &Message) -> Bindings {
        let mut bindings = self.variables.generate(message);
        bindings.insert(PAYLOAD_BINDING.to_string(), (*message.payload).clone());
        bindings.insert(HEADERS_BINDING.to_string(), message.headers_value());
        bindings
    }

    /// Run the script against a message and return the result
    ///
    /// The message itself is left untouched.
    ///
    /// # Errors
    /// An `Execution` error whose source is the interpreter failure.
    pub async fn transform(&self, message: &Message) -> Result<Value> {
        let bindings = self.bindings_for(message);
        debug!(
            "Running {} script for message {}",
            self.script.language, message.id
        );

        self.compiled.run(bindings).await.map_err(|e| {
            error!(
                "{} script failed for message {}: {}",
                self.script.language, message.id, e
            );
            TransformError::execution(
                format!(
                    "{} script failed for message {}",
                    self.script.language, message.id
                ),
                Some(e),
            )
        })
    }

    /// Transform a bare payload with no headers
    pub async fn transform_value(&self, payload: Value) -> Result<Value> {
        self.transform(&Message::new(Arc::new(payload))).await
    }

    /// Transform a message in place
    ///
    /// On success the payload is replaced with the script result. On
    /// failure an [`ErrorInfo`] is appended to the message and the error is
    /// returned.
    pub async fn process_message(&self, message: &mut Message) -> Result<()> {
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.transform(message)).await {
                Ok(result) => result,
                Err(_) => {
                    error!(
                        "{} script timed out after {:?} for message {}",
                        self.script.language, limit, message.id
                    );
                    Err(TransformError::execution(
                        format!(
                            "{} script failed for message {}",
                            self.script.language, message.id
                        ),
                        Some(TransformError::Timeout(format!(
                            "script did not finish within {:?}",
                            limit
                        ))),
                    ))
                }
            },
            None => self.transform(message).await,
        };

        match outcome {
            Ok(result) => {
                message.payload = Arc::new(result);
                Ok(())
            }
            Err(e) => {
                message.add_error(
                    ErrorInfo::from_error(&e)
                        .message_id(message.id.clone())
                        .language(self.script.language.clone())
                        .build(),
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct HeaderEcho;

    impl VariableGenerator for HeaderEcho {
        fn generate(&self, message: &Message) -> Bindings {
            let mut bindings = Bindings::new();
            bindings.insert("id".to_string(), json!(message.id));
            bindings.insert("payload".to_string(), json!("shadowed"));
            bindings
        }
    }

    fn transformer(language: &str, source: &str) -> Result<ScriptTransformer> {
        ScriptTransformer::new(
            ResolvedScript::new(language, source),
            &ExecutorRegistry::with_builtins(),
            Arc::new(StaticVariableGenerator::default()),
        )
    }

    #[test]
    fn test_unknown_language() {
        let err = transformer("cobol", "DISPLAY PAYLOAD.").unwrap_err();
        assert!(matches!(err, TransformError::Configuration(_)));
        assert!(err.to_string().contains("cobol"));
    }

    #[test]
    fn test_compile_error_fails_construction() {
        let err = transformer("rhai", "let = ;").unwrap_err();
        assert!(err.is_startup());
    }

    #[test]
    fn test_payload_and_headers_override_variables() {
        let transformer = ScriptTransformer::new(
            ResolvedScript::new("rhai", "payload"),
            &ExecutorRegistry::with_builtins(),
            Arc::new(HeaderEcho),
        )
        .unwrap();
        let message = Message::from_value(&json!(3)).with_header("kind", "order");

        let bindings = transformer.bindings_for(&message);
        assert_eq!(bindings.get("payload"), Some(&json!(3)));
        assert_eq!(bindings.get("headers"), Some(&json!({"kind": "order"})));
        assert_eq!(bindings.get("id"), Some(&json!(message.id)));
    }

    #[tokio::test]
    async fn test_transform_leaves_message_untouched() {
        let transformer = transformer("rhai", "payload * 2").unwrap();
        let message = Message::from_value(&json!(21));

        assert_eq!(transformer.transform(&message).await.unwrap(), json!(42));
        assert_eq!(*message.payload, json!(21));
    }

    #[tokio::test]
    async fn test_execution_error_wraps_cause() {
        let transformer = transformer("rhai", "payload.missing_fn()").unwrap();
        let err = transformer.transform_value(json!(1)).await.unwrap_err();

        match &err {
            TransformError::Execution { source, .. } => {
                assert!(matches!(source.as_deref(), Some(TransformError::Script(_))));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!err.retryable());
    }

    #[tokio::test]
    async fn test_process_message_records_error() {
        let transformer = transformer("javascript", "payload.nope.deeper").unwrap();
        let mut message = Message::from_value(&json!({}));

        assert!(transformer.process_message(&mut message).await.is_err());
        assert_eq!(message.errors.len(), 1);
        assert_eq!(message.errors[0].code, "EXECUTION_ERROR");
        assert_eq!(message.errors[0].language.as_deref(), Some("javascript"));
        assert_eq!(message.errors[0].message_id.as_deref(), Some(message.id.as_str()));
        assert_eq!(*message.payload, json!({}));
    }
}
