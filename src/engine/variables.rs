use crate::engine::error::{Result, TransformError};
use crate::engine::message::Message;
use crate::engine::utils::{
    infer_value, parse_properties, split_property_line, split_variable_entries,
    unescape_property_value,
};
use log::debug;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Named values exposed to a script execution
pub type Bindings = Map<String, Value>;

/// Supplies the variables for one script execution
///
/// The transformer calls `generate` once per message and adds `payload`
/// and `headers` on top of the returned bindings.
pub trait VariableGenerator: Send + Sync {
    fn generate(&self, message: &Message) -> Bindings;
}

/// Variables fixed at startup from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticVariableGenerator {
    variables: Bindings,
}

impl StaticVariableGenerator {
    pub fn new(variables: Bindings) -> Self {
        Self { variables }
    }

    /// Build from the `variables` text and an optional properties file
    ///
    /// Entries from `variables` override entries of the same name from the
    /// file.
    pub fn from_properties(variables: Option<&str>, location: Option<&Path>) -> Result<Self> {
        let mut bindings = Bindings::new();

        if let Some(path) = location {
            let text = fs::read_to_string(path).map_err(|e| {
                TransformError::Io(format!(
                    "Failed to read variables file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            for (name, raw) in parse_properties(&text) {
                bindings.insert(name, infer_value(unescape_property_value(&raw)));
            }
        }

        if let Some(text) = variables {
            for entry in split_variable_entries(text) {
                if let Some((name, raw)) = split_property_line(entry) {
                    bindings.insert(name.to_string(), infer_value(unescape_property_value(raw)));
                }
            }
        }

        debug!(
            "Configured script variables: {:?}",
            bindings.keys().collect::<Vec<_>>()
        );
        Ok(Self::new(bindings))
    }

    pub fn variables(&self) -> &Bindings {
        &self.variables
    }
}

impl VariableGenerator for StaticVariableGenerator {
    fn generate(&self, _message: &Message) -> Bindings {
        self.variables.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_inline_variables() {
        let generator =
            StaticVariableGenerator::from_properties(Some("limit=5\\n foo=\\ WORLD"), None)
                .unwrap();

        assert_eq!(generator.variables().get("limit"), Some(&json!(5)));
        assert_eq!(generator.variables().get("foo"), Some(&json!(" WORLD")));
    }

    #[test]
    fn test_from_multiline_variables() {
        let generator = StaticVariableGenerator::from_properties(
            Some("# comment\nratio: 0.5\nenabled=true\nname = widget"),
            None,
        )
        .unwrap();

        assert_eq!(
            Value::Object(generator.variables().clone()),
            json!({"ratio": 0.5, "enabled": true, "name": "widget"})
        );
    }

    #[test]
    fn test_inline_variables_override_file() {
        let mut file = NamedTempFile::with_suffix(".properties").unwrap();
        writeln!(file, "limit=10").unwrap();
        writeln!(file, "region=eu").unwrap();

        let generator =
            StaticVariableGenerator::from_properties(Some("limit=5"), Some(file.path())).unwrap();

        assert_eq!(generator.variables().get("limit"), Some(&json!(5)));
        assert_eq!(generator.variables().get("region"), Some(&json!("eu")));
    }

    #[test]
    fn test_missing_variables_file() {
        let err = StaticVariableGenerator::from_properties(None, Some(Path::new("nope.properties")))
            .unwrap_err();
        assert!(matches!(err, TransformError::Io(_)));
    }

    #[test]
    fn test_generate_returns_fresh_copy() {
        let generator = StaticVariableGenerator::from_properties(Some("a=1"), None).unwrap();
        let message = Message::from_value(&json!(null));

        let mut first = generator.generate(&message);
        first.insert("a".to_string(), json!(99));

        assert_eq!(generator.generate(&message).get("a"), Some(&json!(1)));
    }
}
