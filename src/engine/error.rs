use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the script transform stage
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum TransformError {
    /// Invalid or incomplete setup (fatal at startup)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Errors while reading a script or variables file
    #[error("IO error: {0}")]
    Io(String),

    /// Per-message script execution failure
    #[error("Script execution error: {context}")]
    Execution {
        context: String,
        #[source]
        #[serde(skip)]
        source: Option<Box<TransformError>>,
    },

    /// Error reported by the script interpreter itself
    #[error("Script error: {0}")]
    Script(String),

    /// Deadline exceeded while running a script
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// JSON serialization/deserialization errors
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl TransformError {
    /// Creates a new execution error with context
    pub fn execution<S: Into<String>>(context: S, source: Option<TransformError>) -> Self {
        TransformError::Execution {
            context: context.into(),
            source: source.map(Box::new),
        }
    }

    /// Creates a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        TransformError::Configuration(message.into())
    }

    /// Convert from serde_json::Error
    pub fn from_serde(err: serde_json::Error) -> Self {
        TransformError::Deserialization(err.to_string())
    }

    /// Whether this error belongs to the startup class (configuration or I/O).
    ///
    /// Startup errors indicate a deployment defect and must stop the stage
    /// from being constructed; they are never retried.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            TransformError::Configuration(_) | TransformError::Io(_)
        )
    }

    /// Whether this error was raised while running a script for a message
    pub fn is_execution(&self) -> bool {
        matches!(self, TransformError::Execution { .. })
    }

    /// Determines if this error is retryable (worth retrying)
    ///
    /// Only deadline breaches are considered transient. A script that raised
    /// an error will raise it again for the same message, and configuration
    /// problems never fix themselves.
    pub fn retryable(&self) -> bool {
        match self {
            TransformError::Timeout(_) => true,
            TransformError::Execution { source, .. } => {
                source.as_ref().map(|e| e.retryable()).unwrap_or(false)
            }
            TransformError::Configuration(_) => false,
            TransformError::Io(_) => false,
            TransformError::Script(_) => false,
            TransformError::Deserialization(_) => false,
        }
    }

    /// Stable code used in [`ErrorInfo`]
    pub fn code(&self) -> &'static str {
        match self {
            TransformError::Configuration(_) => "CONFIGURATION_ERROR",
            TransformError::Io(_) => "IO_ERROR",
            TransformError::Execution { .. } => "EXECUTION_ERROR",
            TransformError::Script(_) => "SCRIPT_ERROR",
            TransformError::Timeout(_) => "TIMEOUT_ERROR",
            TransformError::Deserialization(_) => "DESERIALIZATION_ERROR",
        }
    }
}

/// Type alias for Result with TransformError
pub type Result<T> = std::result::Result<T, TransformError>;

/// Structured error information attached to a message that failed to transform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code (e.g., "EXECUTION_ERROR", "TIMEOUT_ERROR")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// ID of the message that failed (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Script language in use when the error occurred (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Timestamp when the error occurred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// Whether the pipeline may retry the message
    pub retryable: bool,
}

impl ErrorInfo {
    /// Create a builder for ErrorInfo
    pub fn builder(code: impl Into<String>, message: impl Into<String>) -> ErrorInfoBuilder {
        ErrorInfoBuilder::new(code, message)
    }

    /// A builder pre-filled with the code, message and retryability of `error`
    pub fn from_error(error: &TransformError) -> ErrorInfoBuilder {
        ErrorInfoBuilder::new(error.code(), error.to_string()).retryable(error.retryable())
    }
}

/// Builder for creating ErrorInfo instances with a fluent API
pub struct ErrorInfoBuilder {
    code: String,
    message: String,
    message_id: Option<String>,
    language: Option<String>,
    timestamp: Option<String>,
    retryable: bool,
}

impl ErrorInfoBuilder {
    /// Create a new ErrorInfoBuilder with required fields
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            message_id: None,
            language: None,
            timestamp: Some(Utc::now().to_rfc3339()),
            retryable: false,
        }
    }

    /// Set the message ID
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Set the script language
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set custom timestamp (defaults to now if not set)
    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Mark as retryable
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Build the ErrorInfo instance
    pub fn build(self) -> ErrorInfo {
        ErrorInfo {
            code: self.code,
            message: self.message,
            message_id: self.message_id,
            language: self.language,
            timestamp: self.timestamp,
            retryable: self.retryable,
        }
    }
}
