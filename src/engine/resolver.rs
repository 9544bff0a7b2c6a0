//! # Script Source Resolution Module
//!
//! Turns [`ScriptTransformProperties`] into the [`ResolvedScript`] used for
//! every message: the final language identifier and the final script text,
//! read from a file or decoded from the inline property.

use crate::engine::config::ScriptTransformProperties;
use crate::engine::error::{Result, TransformError};
use crate::engine::executors::builtins::{GROOVY, JAVASCRIPT, PYTHON, RHAI, RUBY};
use log::{debug, info};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the script text came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOrigin {
    Inline,
    File(PathBuf),
}

impl fmt::Display for ScriptOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptOrigin::Inline => write!(f, "inline script"),
            ScriptOrigin::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The startup-computed (language, text) pair
#[derive(Debug, Clone)]
pub struct ResolvedScript {
    /// Lower-cased language identifier
    pub language: String,
    /// Final script text
    pub source: Arc<str>,
    pub origin: ScriptOrigin,
}

impl ResolvedScript {
    pub fn new(language: impl Into<String>, source: impl Into<Arc<str>>) -> Self {
        Self {
            language: language.into().to_ascii_lowercase(),
            source: source.into(),
            origin: ScriptOrigin::Inline,
        }
    }
}

/// Infer the language from a script file name
///
/// Fixed table: `.js`/`.javascript` → javascript, `.groovy` → groovy,
/// `.rb` → ruby, `.py` → python, `.rhai` → rhai.
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    let name = path.file_name()?.to_str()?;
    let suffix = &name[name.rfind('.')?..];

    match suffix.to_ascii_lowercase().as_str() {
        ".js" | ".javascript" => Some(JAVASCRIPT),
        ".groovy" => Some(GROOVY),
        ".rb" => Some(RUBY),
        ".py" => Some(PYTHON),
        ".rhai" => Some(RHAI),
        _ => None,
    }
}

/// Decode an inline script passed through a single-line configuration value
///
/// 1. A single surrounding pair of double quotes is stripped.
/// 2. Each literal `\n` becomes a newline.
/// 3. Each `""` becomes `"`.
pub fn decode_inline_script(raw: &str) -> String {
    let unquoted = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };

    unquoted.replace("\\n", "\n").replace("\"\"", "\"")
}

/// Resolves script text and language from configuration
pub struct ScriptSourceResolver;

impl ScriptSourceResolver {
    /// Resolve the configuration into a [`ResolvedScript`]
    ///
    /// # Errors
    /// * `Configuration` - both or neither of script/scriptFile, missing
    ///   language, or a file suffix that does not name a language
    /// * `Io` - the script file could not be read
    pub fn resolve(config: &ScriptTransformProperties) -> Result<ResolvedScript> {
        let explicit_language = config.effective_language();

        match (config.effective_script(), config.script_file.as_ref()) {
            (Some(_), Some(_)) => Err(TransformError::configuration(
                "the script and scriptFile properties are mutually exclusive",
            )),
            (None, None) => Err(TransformError::configuration(
                "one of the script or scriptFile properties is required",
            )),
            (Some(raw), None) => {
                let language = explicit_language.ok_or_else(|| {
                    TransformError::configuration(
                        "the language property is required when script is specified",
                    )
                })?;
                let source = decode_inline_script(raw);
                debug!("Decoded inline {} script: {:?}", language, source);
                info!("Resolved inline {} script", language);

                Ok(ResolvedScript {
                    language: language.to_ascii_lowercase(),
                    source: Arc::from(source),
                    origin: ScriptOrigin::Inline,
                })
            }
            (None, Some(path)) => {
                let language = match explicit_language {
                    Some(language) => language.to_ascii_lowercase(),
                    None => language_for_path(path)
                        .ok_or_else(|| {
                            TransformError::configuration(format!(
                                "unable to determine language from scriptFile name '{}'",
                                path.display()
                            ))
                        })?
                        .to_string(),
                };

                let source = fs::read_to_string(path).map_err(|e| {
                    TransformError::Io(format!(
                        "Failed to read script file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!("Resolved {} script from {}", language, path.display());

                Ok(ResolvedScript {
                    language,
                    source: Arc::from(source),
                    origin: ScriptOrigin::File(path.clone()),
                })
            }
        }
    }
}
