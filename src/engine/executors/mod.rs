//! # Script Executor Module
//!
//! A [`ScriptExecutor`] compiles script text for one language once, at
//! startup; the resulting [`CompiledScript`] is run once per message with
//! that message's bindings. The [`ExecutorRegistry`] maps case-insensitive
//! language identifiers (and their aliases) to executors.

use crate::engine::error::Result;
use crate::engine::variables::Bindings;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub mod javascript;
pub use javascript::JavaScriptExecutor;

pub mod rhai_executor;
pub use rhai_executor::RhaiExecutor;

pub mod process;
pub use process::ProcessExecutor;

#[cfg(feature = "python")]
pub mod python;
#[cfg(feature = "python")]
pub use python::PythonExecutor;

// Re-export all built-in executors for easier access
pub mod builtins {
    use super::*;

    // Canonical language identifiers
    pub const JAVASCRIPT: &str = "javascript";
    pub const RHAI: &str = "rhai";
    pub const PYTHON: &str = "python";
    pub const RUBY: &str = "ruby";
    pub const GROOVY: &str = "groovy";

    pub const JAVASCRIPT_ALIASES: &[&str] = &[JAVASCRIPT, "js", "ecmascript"];
    pub const RHAI_ALIASES: &[&str] = &[RHAI];
    pub const PYTHON_ALIASES: &[&str] = &[PYTHON, "py", "jython"];
    pub const RUBY_ALIASES: &[&str] = &[RUBY, "rb", "jruby"];
    pub const GROOVY_ALIASES: &[&str] = &[GROOVY];

    /// All identifiers a built-in language is registered under
    pub fn aliases(language: &str) -> Option<&'static [&'static str]> {
        let language = language.to_ascii_lowercase();
        [
            JAVASCRIPT_ALIASES,
            RHAI_ALIASES,
            PYTHON_ALIASES,
            RUBY_ALIASES,
            GROOVY_ALIASES,
        ]
        .into_iter()
        .find(|names| names.contains(&language.as_str()))
    }

    // Embedded interpreter with the `python` feature, `python3` otherwise
    #[cfg(feature = "python")]
    fn python_executor() -> Arc<dyn ScriptExecutor> {
        Arc::new(PythonExecutor::new())
    }

    #[cfg(not(feature = "python"))]
    fn python_executor() -> Arc<dyn ScriptExecutor> {
        Arc::new(ProcessExecutor::python())
    }

    // Get all built-in executors with the identifiers they answer to
    pub fn get_all_executors() -> Vec<(&'static [&'static str], Arc<dyn ScriptExecutor>)> {
        vec![
            (
                JAVASCRIPT_ALIASES,
                Arc::new(JavaScriptExecutor::new()) as Arc<dyn ScriptExecutor>,
            ),
            (RHAI_ALIASES, Arc::new(RhaiExecutor::new())),
            (PYTHON_ALIASES, python_executor()),
            (RUBY_ALIASES, Arc::new(ProcessExecutor::ruby())),
            (GROOVY_ALIASES, Arc::new(ProcessExecutor::groovy())),
        ]
    }
}

/// Compiles scripts for one language
///
/// Implementations must be safe to share across threads; compilation
/// happens once per stage, at construction time.
pub trait ScriptExecutor: Send + Sync {
    /// Canonical language identifier
    fn language(&self) -> &str;

    /// Prepare `source` for repeated execution
    ///
    /// # Errors
    /// A `Configuration` error when the script cannot be compiled.
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledScript>>;
}

/// A script ready to be run against per-message bindings
///
/// `run` must not retain or mutate state between calls: concurrent runs
/// with different bindings are independent.
#[async_trait]
pub trait CompiledScript: Send + Sync {
    /// Run the script and return its result as a JSON value
    async fn run(&self, bindings: Bindings) -> Result<Value>;
}

/// Maps language identifiers to executors
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn ScriptExecutor>>,
}

impl ExecutorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// A registry with the JavaScript, Rhai, Python, Ruby and Groovy executors
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (names, executor) in builtins::get_all_executors() {
            registry.register(names.iter().copied(), executor);
        }
        registry
    }

    /// Register an executor under one or more identifiers
    ///
    /// Identifiers are case-insensitive; a later registration replaces an
    /// earlier one for the same identifier.
    pub fn register<I, S>(&mut self, names: I, executor: Arc<dyn ScriptExecutor>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let key = name.as_ref().to_ascii_lowercase();
            debug!(
                "Registering {} executor as '{}'",
                executor.language(),
                key
            );
            self.executors.insert(key, Arc::clone(&executor));
        }
    }

    /// Run a language through an external interpreter program
    ///
    /// Applies to the language and all of its aliases, and also switches an
    /// embedded Python to the process-backed one. Languages without a
    /// process driver are left unchanged.
    pub fn with_interpreter(mut self, language: &str, program: impl Into<String>) -> Self {
        let executor = builtins::aliases(language).and_then(|names| {
            ProcessExecutor::for_language(names[0]).map(|executor| (names, executor))
        });

        match executor {
            Some((names, executor)) => {
                let executor = executor.with_program(program);
                self.register(names.iter().copied(), Arc::new(executor));
            }
            None => warn!(
                "Cannot set an interpreter for '{}': not a process-backed language",
                language
            ),
        }
        self
    }

    /// Look up the executor for a language identifier
    ///
    /// Returns `None` for unknown identifiers.
    pub fn get(&self, language: &str) -> Option<Arc<dyn ScriptExecutor>> {
        self.executors
            .get(&language.to_ascii_lowercase())
            .map(Arc::clone)
    }

    /// Check if an executor exists for a language identifier
    pub fn contains(&self, language: &str) -> bool {
        self.executors.contains_key(&language.to_ascii_lowercase())
    }

    /// All registered identifiers, sorted
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.executors.keys().cloned().collect();
        languages.sort();
        languages
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::builtins::*;
    use super::*;
    use serde_json::json;

    struct EchoExecutor;

    struct EchoScript;

    impl ScriptExecutor for EchoExecutor {
        fn language(&self) -> &str {
            "echo"
        }

        fn compile(&self, _source: &str) -> Result<Arc<dyn CompiledScript>> {
            Ok(Arc::new(EchoScript))
        }
    }

    #[async_trait]
    impl CompiledScript for EchoScript {
        async fn run(&self, bindings: Bindings) -> Result<Value> {
            Ok(bindings.get("payload").cloned().unwrap_or(Value::Null))
        }
    }

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        let registry = ExecutorRegistry::with_builtins();

        for name in ["javascript", "JS", "EcmaScript", "rhai", "Python", "py", "RUBY", "rb", "groovy"] {
            assert!(registry.contains(name), "{} should be registered", name);
        }
        assert_eq!(registry.get("JS").unwrap().language(), JAVASCRIPT);
        assert_eq!(registry.get("jruby").unwrap().language(), RUBY);
    }

    #[test]
    fn test_unknown_language_is_absent() {
        let registry = ExecutorRegistry::default();
        assert!(registry.get("cobol").is_none());
        assert!(!registry.contains("cobol"));
    }

    #[test]
    fn test_register_custom_executor() {
        let mut registry = ExecutorRegistry::new();
        registry.register(["echo", "ECHO2"], Arc::new(EchoExecutor));

        assert_eq!(registry.languages(), vec!["echo", "echo2"]);
        assert!(registry.get("Echo2").is_some());
    }

    #[tokio::test]
    async fn test_custom_executor_runs() {
        let mut registry = ExecutorRegistry::new();
        registry.register(["echo"], Arc::new(EchoExecutor));

        let script = registry.get("echo").unwrap().compile("ignored").unwrap();
        let mut bindings = Bindings::new();
        bindings.insert("payload".to_string(), json!({"id": 7}));

        assert_eq!(script.run(bindings).await.unwrap(), json!({"id": 7}));
    }

    #[test]
    fn test_aliases() {
        assert_eq!(aliases("JS"), Some(JAVASCRIPT_ALIASES));
        assert_eq!(aliases("jython"), Some(PYTHON_ALIASES));
        assert_eq!(aliases("cobol"), None);
    }

    #[test]
    fn test_with_interpreter_covers_aliases() {
        let registry = ExecutorRegistry::with_builtins().with_interpreter("py", "/opt/python/bin/python3");

        for name in PYTHON_ALIASES {
            assert_eq!(registry.get(name).unwrap().language(), PYTHON);
        }
        // embedded languages are not affected
        let registry = registry.with_interpreter("js", "node");
        assert_eq!(registry.get("js").unwrap().language(), JAVASCRIPT);
    }
}
