use crate::engine::error::{Result, TransformError};
use crate::engine::utils::parse_properties;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration surface of the script transform stage
///
/// Exactly one of `script` and `script_file` must be set. `language` is
/// required for inline scripts and for files whose suffix does not name a
/// known language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptTransformProperties {
    /// Language identifier (case-insensitive)
    #[serde(default)]
    pub language: Option<String>,

    /// Inline script text
    #[serde(default)]
    pub script: Option<String>,

    /// Path to a script file
    #[serde(default, alias = "scriptfile", alias = "script-file", alias = "script_file")]
    pub script_file: Option<PathBuf>,

    /// Newline-separated `name=value` variable definitions
    #[serde(default)]
    pub variables: Option<String>,

    /// Path to a properties file with variable definitions
    #[serde(
        default,
        alias = "variableslocation",
        alias = "variables-location",
        alias = "variables_location"
    )]
    pub variables_location: Option<PathBuf>,
}

impl ScriptTransformProperties {
    /// Creates a config with an inline script.
    pub fn with_script(language: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            script: Some(script.into()),
            ..Self::default()
        }
    }

    /// Creates a config with a script file path.
    pub fn with_script_file(path: impl Into<PathBuf>) -> Self {
        Self {
            script_file: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the variable definitions.
    pub fn with_variables(mut self, variables: impl Into<String>) -> Self {
        self.variables = Some(variables.into());
        self
    }

    /// Sets the variables file.
    pub fn with_variables_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.variables_location = Some(path.into());
        self
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(TransformError::from_serde)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json_str = fs::read_to_string(path).map_err(|e| {
            TransformError::Io(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&json_str)
    }

    /// Load configuration from properties text (`key=value` lines)
    ///
    /// Keys are matched case-insensitively and `-`/`_` are ignored, so
    /// `scriptFile`, `scriptfile` and `script-file` are the same key. Values
    /// are taken verbatim; decoding of script text and variables happens
    /// during resolution. Unknown keys are logged and ignored.
    pub fn from_properties(text: &str) -> Result<Self> {
        let mut config = Self::default();

        for (key, value) in parse_properties(text) {
            let normalized: String = key
                .chars()
                .filter(|c| *c != '-' && *c != '_')
                .map(|c| c.to_ascii_lowercase())
                .collect();

            match normalized.as_str() {
                "language" => config.language = Some(value),
                "script" => config.script = Some(value),
                "scriptfile" => config.script_file = Some(PathBuf::from(value)),
                "variables" => config.variables = Some(value),
                "variableslocation" => config.variables_location = Some(PathBuf::from(value)),
                _ => warn!("Ignoring unknown script transform property: {}", key),
            }
        }

        Ok(config)
    }

    /// Language with blank values treated as absent
    pub fn effective_language(&self) -> Option<&str> {
        self.language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    /// Inline script with empty text treated as absent
    pub fn effective_script(&self) -> Option<&str> {
        self.script.as_deref().filter(|s| !s.is_empty())
    }
}
