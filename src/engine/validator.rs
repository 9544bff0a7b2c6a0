//! # Properties Validation Module
//!
//! Fail-fast checks over [`ScriptTransformProperties`], run before the
//! transformer is constructed so that a misconfigured stage is rejected at
//! startup rather than at its first message.

use crate::engine::config::ScriptTransformProperties;
use crate::engine::error::{Result, TransformError};
use crate::engine::resolver::language_for_path;
use log::error;
use std::fmt;
use std::path::PathBuf;

/// A single configuration violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Both `script` and `scriptFile` were given
    ScriptAndFile,
    /// Neither `script` nor `scriptFile` was given
    NoScript,
    /// An inline script was given without a language
    MissingLanguage,
    /// The script file name does not determine a language
    UnknownSuffix(PathBuf),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::ScriptAndFile => write!(
                f,
                "the script and scriptFile properties are mutually exclusive"
            ),
            Violation::NoScript => write!(
                f,
                "one of the script or scriptFile properties is required"
            ),
            Violation::MissingLanguage => write!(
                f,
                "the language property is required when script is specified"
            ),
            Violation::UnknownSuffix(path) => write!(
                f,
                "unable to determine language from scriptFile name '{}'",
                path.display()
            ),
        }
    }
}

/// Validates script transform properties
///
/// Every violation is collected; [`PropertiesValidator::ensure_valid`]
/// reports them together as one hard [`TransformError::Configuration`].
pub struct PropertiesValidator;

impl PropertiesValidator {
    /// Collect all violations in the configuration
    pub fn validate(config: &ScriptTransformProperties) -> Vec<Violation> {
        let mut violations = Vec::new();
        let script = config.effective_script();
        let script_file = config.script_file.as_ref();
        let language = config.effective_language();

        match (script, script_file) {
            (Some(_), Some(_)) => violations.push(Violation::ScriptAndFile),
            (None, None) => violations.push(Violation::NoScript),
            _ => {}
        }

        if language.is_none() {
            if script.is_some() {
                violations.push(Violation::MissingLanguage);
            }
            if let Some(path) = script_file {
                if language_for_path(path).is_none() {
                    violations.push(Violation::UnknownSuffix(path.clone()));
                }
            }
        }

        violations
    }

    /// Fail with a configuration error naming every violation
    pub fn ensure_valid(config: &ScriptTransformProperties) -> Result<()> {
        let violations = Self::validate(config);
        if violations.is_empty() {
            return Ok(());
        }

        let message = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        error!("Invalid script transform properties: {}", message);
        Err(TransformError::Configuration(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_inline_script() {
        let config = ScriptTransformProperties::with_script("groovy", "payload");
        assert!(PropertiesValidator::validate(&config).is_empty());
        assert!(PropertiesValidator::ensure_valid(&config).is_ok());
    }

    #[test]
    fn test_valid_script_file_with_inferred_language() {
        let config = ScriptTransformProperties::with_script_file("scripts/basic.rb");
        assert!(PropertiesValidator::validate(&config).is_empty());
    }

    #[test]
    fn test_both_script_and_file() {
        let mut config = ScriptTransformProperties::with_script("js", "payload");
        config.script_file = Some(PathBuf::from("basic.js"));

        assert_eq!(
            PropertiesValidator::validate(&config),
            vec![Violation::ScriptAndFile]
        );
        let err = PropertiesValidator::ensure_valid(&config).unwrap_err();
        assert!(matches!(err, TransformError::Configuration(_)));
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_neither_script_nor_file() {
        let config = ScriptTransformProperties::default().with_language("js");
        assert_eq!(
            PropertiesValidator::validate(&config),
            vec![Violation::NoScript]
        );
    }

    #[test]
    fn test_inline_script_without_language() {
        let config = ScriptTransformProperties {
            script: Some("payload".to_string()),
            ..Default::default()
        };
        assert_eq!(
            PropertiesValidator::validate(&config),
            vec![Violation::MissingLanguage]
        );
    }

    #[test]
    fn test_unknown_suffix_without_language() {
        let config = ScriptTransformProperties::with_script_file("transform.cob");
        assert_eq!(
            PropertiesValidator::validate(&config),
            vec![Violation::UnknownSuffix(PathBuf::from("transform.cob"))]
        );

        let config = ScriptTransformProperties::with_script_file("transform.cob").with_language("cobol");
        assert!(PropertiesValidator::validate(&config).is_empty());
    }

    #[test]
    fn test_all_violations_reported_together() {
        let config = ScriptTransformProperties {
            script: Some("payload".to_string()),
            script_file: Some(PathBuf::from("noext")),
            ..Default::default()
        };

        let violations = PropertiesValidator::validate(&config);
        assert_eq!(
            violations,
            vec![
                Violation::ScriptAndFile,
                Violation::MissingLanguage,
                Violation::UnknownSuffix(PathBuf::from("noext")),
            ]
        );

        let message = PropertiesValidator::ensure_valid(&config)
            .unwrap_err()
            .to_string();
        assert!(message.contains("mutually exclusive"));
        assert!(message.contains("language property is required"));
        assert!(message.contains("noext"));
    }
}
