pub mod config;
pub mod error;
pub mod executors;
pub mod message;
pub mod resolver;
pub mod transformer;
pub mod utils;
pub mod validator;
pub mod variables;

// Re-export key types for easier access
pub use config::ScriptTransformProperties;
pub use error::{ErrorInfo, Result, TransformError};
pub use executors::{CompiledScript, ExecutorRegistry, ScriptExecutor};
pub use message::Message;
pub use resolver::{ResolvedScript, ScriptOrigin, ScriptSourceResolver};
pub use transformer::ScriptTransformer;
pub use validator::{PropertiesValidator, Violation};
pub use variables::{Bindings, StaticVariableGenerator, VariableGenerator};
