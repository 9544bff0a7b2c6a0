//! # Utility Functions Module
//!
//! Helpers for the Java-style properties text used by the configuration
//! surface and by script variables:
//! - Splitting `key=value` / `key: value` lines
//! - Property value unescaping (`\ `, `\\`, `\t`, `\uXXXX`)
//! - Typing variable values as JSON scalars

use serde_json::{Number, Value};

/// Split a properties line into key and raw value
///
/// The separator is the first unescaped `=` or `:`. The key is trimmed and
/// leading whitespace is removed from the value; the value is otherwise
/// returned verbatim.
///
/// Returns `None` for blank lines, comment lines (`#` or `!`) and lines
/// without a separator.
pub fn split_property_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
        return None;
    }

    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            '=' | ':' if !escaped => {
                let key = line[..idx].trim();
                if key.is_empty() {
                    return None;
                }
                let value = line[idx + 1..].trim_start();
                return Some((key, value.trim_end_matches('\r')));
            }
            _ => escaped = false,
        }
    }
    None
}

/// Parse properties text into `(key, raw value)` pairs, keeping order
///
/// Entries are separated by real newlines only.
pub fn parse_properties(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(split_property_line)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Split variable definitions on real newlines and on literal `\n` sequences
///
/// Single-line configuration mechanisms cannot carry raw newlines, so
/// `limit=5\n foo=bar` (with a literal backslash-n) holds two entries.
pub fn split_variable_entries(text: &str) -> Vec<&str> {
    text.lines()
        .flat_map(|line| line.split("\\n"))
        .filter(|entry| !entry.trim().is_empty())
        .collect()
}

/// Unescape a properties value
///
/// Supports `\t`, `\n`, `\r`, `\f`, `\uXXXX`; any other escaped character
/// stands for itself (so `\ ` keeps a leading space and `\\` is a backslash).
/// A malformed `\u` escape is kept as written.
pub fn unescape_property_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => {
                        out.push(decoded);
                        for _ in 0..4 {
                            chars.next();
                        }
                    }
                    _ => out.push_str("\\u"),
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

/// Type a variable value as a JSON scalar
///
/// Canonical integers and decimals become numbers, `true`/`false` become
/// booleans and everything else stays a string. Values such as `007` or
/// `+5` are not canonical and stay strings.
pub fn infer_value(text: String) -> Value {
    match text.as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(int) = text.parse::<i64>() {
        if int.to_string() == text {
            return Value::Number(int.into());
        }
    }

    let looks_decimal = text.contains('.')
        && !text.starts_with('.')
        && !text.ends_with('.')
        && !text.starts_with('+')
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == '-');
    if looks_decimal {
        if let Some(number) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(number);
        }
    }

    Value::String(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_property_line() {
        assert_eq!(split_property_line("script=payload+foo"), Some(("script", "payload+foo")));
        assert_eq!(split_property_line("  language : js"), Some(("language", "js")));
        assert_eq!(
            split_property_line("variables=limit=5\\n foo=bar"),
            Some(("variables", "limit=5\\n foo=bar"))
        );
        assert_eq!(split_property_line("a\\=b=c"), Some(("a\\=b", "c")));
    }

    #[test]
    fn test_split_property_line_skips_comments_and_blanks() {
        assert_eq!(split_property_line(""), None);
        assert_eq!(split_property_line("   "), None);
        assert_eq!(split_property_line("# comment"), None);
        assert_eq!(split_property_line("! comment"), None);
        assert_eq!(split_property_line("no separator"), None);
        assert_eq!(split_property_line("=value"), None);
    }

    #[test]
    fn test_parse_properties_keeps_order() {
        let parsed = parse_properties("b=2\n# skipped\na=1\r\n");
        assert_eq!(
            parsed,
            vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string())
            ]
        );
    }

    #[test]
    fn test_split_variable_entries() {
        assert_eq!(
            split_variable_entries("limit=5\\n foo=\\ WORLD"),
            vec!["limit=5", " foo=\\ WORLD"]
        );
        assert_eq!(split_variable_entries("a=1\n\nb=2"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_unescape_property_value() {
        assert_eq!(unescape_property_value("\\ WORLD"), " WORLD");
        assert_eq!(unescape_property_value("a\\\\b"), "a\\b");
        assert_eq!(unescape_property_value("tab\\there"), "tab\there");
        assert_eq!(unescape_property_value("\\u0041BC"), "ABC");
        assert_eq!(unescape_property_value("\\uZZ"), "\\uZZ");
        assert_eq!(unescape_property_value("trailing\\"), "trailing\\");
    }

    #[test]
    fn test_infer_value() {
        assert_eq!(infer_value("5".to_string()), json!(5));
        assert_eq!(infer_value("-12".to_string()), json!(-12));
        assert_eq!(infer_value("2.5".to_string()), json!(2.5));
        assert_eq!(infer_value("true".to_string()), json!(true));
        assert_eq!(infer_value("007".to_string()), json!("007"));
        assert_eq!(infer_value("+5".to_string()), json!("+5"));
        assert_eq!(infer_value("1.2.3".to_string()), json!("1.2.3"));
        assert_eq!(infer_value(" WORLD".to_string()), json!(" WORLD"));
    }
}
