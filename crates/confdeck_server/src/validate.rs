//! Validation of config documents against a JSON-schema subset.
//!
//! Supported keywords: `type`, `properties`, `required`, `items`,
//! `minimum`, `maximum` and `enum`. Unknown keywords are ignored, and keys
//! without a `properties` entry are accepted. Every violation is reported,
//! not just the first.

use confdeck_core::error::FieldError;
use confdeck_core::path::DocPath;
use serde_json::Value;

/// Check `document` against `schema`.
///
/// # Returns
/// One [`FieldError`] per violation; empty when the document is valid.
pub fn validate_document(schema: &Value, document: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let mut path = DocPath::root();
    validate_node(schema, document, &mut path, &mut errors);
    errors
}

fn validate_node(schema: &Value, value: &Value, path: &mut DocPath, errors: &mut Vec<FieldError>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        if !matches_type(expected, value) {
            errors.push(FieldError::new(
                path.clone(),
                format!("expected {}, found {}", describe_type(expected), type_name(value)),
            ));
            // Nested keywords assume the declared type.
            return;
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
            errors.push(FieldError::new(
                path.clone(),
                format!("must be one of {}", options.join(", ")),
            ));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
            if number < minimum {
                errors.push(FieldError::new(
                    path.clone(),
                    format!("must be >= {}", schema["minimum"]),
                ));
            }
        }
        if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64) {
            if number > maximum {
                errors.push(FieldError::new(
                    path.clone(),
                    format!("must be <= {}", schema["maximum"]),
                ));
            }
        }
    }

    match value {
        Value::Object(map) => {
            if let Some(Value::Array(required)) = schema.get("required") {
                for key in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(key) {
                        errors.push(FieldError::new(path.child(key), "is required"));
                    }
                }
            }
            if let Some(Value::Object(properties)) = schema.get("properties") {
                for (key, child) in map {
                    if let Some(child_schema) = properties.get(key) {
                        path.push(key.as_str());
                        validate_node(child_schema, child, path, errors);
                        path.pop();
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (index, item) in items.iter().enumerate() {
                    path.push(index);
                    validate_node(item_schema, item, path, errors);
                    path.pop();
                }
            }
        }
        _ => {}
    }
}

fn matches_type(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_type_name(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(name, value)),
        _ => true,
    }
}

fn matches_type_name(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(number) => {
                number.is_i64()
                    || number.is_u64()
                    || number.as_f64().is_some_and(|float| float.fract() == 0.0)
            }
            _ => false,
        },
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::validate_document;
    use serde_json::{json, Value};

    fn gateway_schema() -> Value {
        json!({
            "type": "object",
            "required": ["gateway"],
            "properties": {
                "gateway": {
                    "type": "object",
                    "properties": {
                        "port": {"type": "integer", "minimum": 1, "maximum": 65535},
                        "bind": {"enum": ["loopback", "lan"]}
                    }
                },
                "tools": {
                    "type": "object",
                    "properties": {
                        "allow": {"type": "array", "items": {"type": "string"}}
                    }
                }
            }
        })
    }

    fn dotted(errors: &[confdeck_core::FieldError]) -> Vec<String> {
        errors.iter().map(|error| error.path.to_dotted()).collect()
    }

    #[test]
    fn valid_document_has_no_errors() {
        let doc = json!({
            "gateway": {"port": 18789, "bind": "loopback"},
            "tools": {"allow": ["ls", "bash"]},
            "extra": true
        });
        assert!(validate_document(&gateway_schema(), &doc).is_empty());
    }

    #[test]
    fn reports_every_violation_with_its_path() {
        let doc = json!({
            "gateway": {"port": 70000, "bind": "wan"},
            "tools": {"allow": ["ls", 3]}
        });
        let errors = validate_document(&gateway_schema(), &doc);
        assert_eq!(
            dotted(&errors),
            vec!["gateway.port", "gateway.bind", "tools.allow.1"]
        );
        assert!(errors[0].message.contains("<= 65535"));
        assert_eq!(errors[2].message, "expected string, found integer");
    }

    #[test]
    fn missing_required_key_and_wrong_type() {
        let errors = validate_document(&gateway_schema(), &json!({"tools": []}));
        assert_eq!(dotted(&errors), vec!["gateway", "tools"]);
        assert_eq!(errors[0].message, "is required");
        assert_eq!(errors[1].message, "expected object, found array");
    }

    #[test]
    fn integer_accepts_whole_floats_only() {
        let schema = json!({"type": "integer"});
        assert!(validate_document(&schema, &json!(3.0)).is_empty());
        assert_eq!(validate_document(&schema, &json!(3.5)).len(), 1);
    }
}
