//! Text helpers shared by the CLI and config loading.

/// Trim an optional string and drop empty values.
pub fn normalize_optional_nonempty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Parse a CLI/env value as JSON, falling back to a plain string.
///
/// `19000` becomes a number and `["ls"]` an array, while `loopback` (not
/// valid JSON) is kept as the string `"loopback"`.
pub fn parse_value_lenient(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{normalize_optional_nonempty, parse_value_lenient};
    use serde_json::json;

    #[test]
    fn normalize_optional_nonempty_trims_and_drops_blank() {
        assert_eq!(
            normalize_optional_nonempty(Some("  value  ".to_string())),
            Some("value".to_string())
        );
        assert_eq!(normalize_optional_nonempty(Some("   ".to_string())), None);
        assert_eq!(normalize_optional_nonempty(None), None);
    }

    #[test]
    fn lenient_values_prefer_json() {
        assert_eq!(parse_value_lenient("19000"), json!(19000));
        assert_eq!(parse_value_lenient("[\"ls\"]"), json!(["ls"]));
        assert_eq!(parse_value_lenient("true"), json!(true));
        assert_eq!(parse_value_lenient("loopback"), json!("loopback"));
        assert_eq!(parse_value_lenient(""), json!(""));
    }
}
