// SPDX-License-Identifier: MIT

//! Input validation against a JSON-schema subset
//!
//! Supports `type` (single or list, `integer` included), `required`,
//! `properties` (recursively) and `enum`. Every violation is reported, not just
//! the first.

use serde_json::Value;

/// Validate `input` against `schema`, returning all violations
pub fn validate(schema: &Value, input: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    check(schema, input, "", &mut violations);
    violations
}

fn check(schema: &Value, value: &Value, path: &str, out: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        if !type_matches(expected, value) {
            out.push(format!(
                "{}: expected {}, got {}",
                display_path(path),
                describe_type(expected),
                type_name(value)
            ));
            return;
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            out.push(format!(
                "{}: value {} not in {}",
                display_path(path),
                value,
                Value::Array(allowed.clone())
            ));
        }
    }

    let Some(object) = value.as_object() else {
        return;
    };

    if let Some(Value::Array(required)) = schema.get("required") {
        for field in required.iter().filter_map(Value::as_str) {
            if object.get(field).map_or(true, Value::is_null) {
                out.push(format!("{}: is required", join(path, field)));
            }
        }
    }

    if let Some(Value::Object(properties)) = schema.get("properties") {
        for (field, field_schema) in properties {
            if let Some(field_value) = object.get(field) {
                if field_value.is_null() {
                    continue;
                }
                check(field_schema, field_value, &join(path, field), out);
            }
        }
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_named(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_named(name, value)),
        _ => true,
    }
}

fn matches_named(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown type names are not enforced
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
            .join(" | "),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "input"
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["channel", "text"],
            "properties": {
                "channel": { "type": "string" },
                "text": { "type": "string" },
                "priority": { "type": "integer", "enum": [1, 2, 3] },
                "thread": { "type": ["string", "null"] },
                "meta": {
                    "type": "object",
                    "required": ["source"],
                    "properties": { "source": { "type": "string" } }
                }
            }
        })
    }

    #[test]
    fn test_valid_input() {
        let input = json!({"channel": "#ops", "text": "hi", "priority": 2});
        assert!(validate(&schema(), &input).is_empty());
    }

    #[test]
    fn test_reports_every_violation() {
        let input = json!({"channel": 42, "priority": 7});
        let violations = validate(&schema(), &input);
        assert_eq!(violations.len(), 3, "{:?}", violations);
        assert!(violations.iter().any(|v| v.contains("text: is required")));
        assert!(violations.iter().any(|v| v.contains("channel: expected string")));
        assert!(violations.iter().any(|v| v.contains("priority: value 7")));
    }

    #[test]
    fn test_nested_objects() {
        let input = json!({"channel": "c", "text": "t", "meta": {}});
        let violations = validate(&schema(), &input);
        assert_eq!(violations, vec!["meta.source: is required".to_string()]);
    }

    #[test]
    fn test_type_list_and_integer() {
        let input = json!({"channel": "c", "text": "t", "thread": "123", "priority": 3});
        assert!(validate(&schema(), &input).is_empty());

        let input = json!({"channel": "c", "text": "t", "priority": 1.5});
        let violations = validate(&schema(), &input);
        assert!(violations[0].contains("expected integer"));
    }

    #[test]
    fn test_root_type_mismatch() {
        let violations = validate(&schema(), &json!("nope"));
        assert_eq!(violations, vec!["input: expected object, got string".to_string()]);
    }
}
