// SPDX-License-Identifier: MIT

//! Condition evaluation
//!
//! Resolution problems never raise: a missing reference or a malformed
//! filter expression on the left side evaluates as undefined.

use super::ast::{CompareOp, Condition};
use crate::workflow::path;
use super::literal::{parse_literal, parse_number};
use crate::workflow::template;
use serde_json::Value;

/// Evaluate a parsed condition against a template namespace
pub fn evaluate(condition: &Condition, namespace: &Value) -> bool {
    match condition {
        Condition::Truthy(reference) => truthy(resolve_left(reference, namespace).as_ref()),
        Condition::Compare { left, op, right } => {
            let left = resolve_left(left, namespace);
            compare(left.as_ref(), *op, right)
        }
    }
}

fn compare(left: Option<&Value>, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => loose_equals(left, Some(right)),
        CompareOp::NotEq => !loose_equals(left, Some(right)),
        // NaN on either side makes every ordering false
        CompareOp::Gt => to_number(left) > to_number(Some(right)),
        CompareOp::Gte => to_number(left) >= to_number(Some(right)),
        CompareOp::Lt => to_number(left) < to_number(Some(right)),
        CompareOp::Lte => to_number(left) <= to_number(Some(right)),
    }
}

/// Literal, filter/regex expression, template, or path lookup
fn resolve_left(text: &str, namespace: &Value) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(literal) = parse_literal(text) {
        return Some(literal);
    }
    if text.contains("{{") {
        return template::render_str(text, namespace)
            .map_err(|e| log::debug!("Condition operand '{}' unresolved: {}", text, e))
            .ok();
    }
    if text.contains('|') || text.contains("=~") {
        return template::evaluate_expression(text, namespace)
            .map_err(|e| log::debug!("Condition operand '{}' unresolved: {}", text, e))
            .ok()
            .flatten();
    }
    path::get(namespace, text).cloned()
}

/// Coercing equality.
///
/// - undefined and null equal each other and nothing else
/// - a boolean is compared as the number 0 or 1
/// - a number and a string compare numerically (`"42" == 42`)
/// - arrays and objects compare structurally with their own kind only
pub fn loose_equals(left: Option<&Value>, right: Option<&Value>) -> bool {
    let left = left.filter(|v| !v.is_null());
    let right = right.filter(|v| !v.is_null());

    match (left, right) {
        (None, None) => true,
        (None, Some(_)) | (Some(_), None) => false,
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a == b,
        (Some(Value::String(a)), Some(Value::String(b))) => a == b,
        (Some(Value::Number(_)), Some(Value::Number(_))) => {
            to_number(left) == to_number(right)
        }
        (Some(Value::Bool(_)), Some(_)) | (Some(_), Some(Value::Bool(_))) => {
            let (a, b) = (to_number(left), to_number(right));
            match (left, right) {
                (Some(Value::Bool(_)), Some(other)) if !is_primitive(other) => false,
                (Some(other), Some(Value::Bool(_))) if !is_primitive(other) => false,
                _ => a == b,
            }
        }
        (Some(Value::Number(_)), Some(Value::String(_)))
        | (Some(Value::String(_)), Some(Value::Number(_))) => {
            to_number(left) == to_number(right)
        }
        (Some(a @ Value::Array(_)), Some(b @ Value::Array(_)))
        | (Some(a @ Value::Object(_)), Some(b @ Value::Object(_))) => a == b,
        _ => false,
    }
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Numeric coercion: undefined and non-numeric text are NaN, null and "" are 0
pub fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return 0.0;
            }
            match parse_number(s) {
                Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
                _ => f64::NAN,
            }
        }
        Some(Value::Array(_)) | Some(Value::Object(_)) => f64::NAN,
    }
}

/// undefined, null, false, 0, NaN and "" are false; everything else is true
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::condition::parser::parse;
    use serde_json::json;

    fn eval(condition: &str, ns: &Value) -> bool {
        evaluate(&parse(condition), ns)
    }

    fn ns() -> Value {
        json!({
            "status": "failed",
            "count": 7,
            "count_text": "7",
            "score": 7.5,
            "enabled": true,
            "empty": "",
            "zero": 0,
            "user": { "email": "Ada@Corp.com", "roles": ["admin"] },
            "nothing": null
        })
    }

    #[test]
    fn test_literal_comparisons() {
        assert!(eval("5 > 3", &ns()));
        assert!(!eval("3 > 5", &ns()));
        assert!(eval("'a' == 'a'", &ns()));
    }

    #[test]
    fn test_string_equality() {
        assert!(eval("status == 'failed'", &ns()));
        assert!(eval("status == failed", &ns()));
        assert!(eval("status != 'ok'", &ns()));
    }

    #[test]
    fn test_numeric_coercion() {
        assert!(eval("count == '7'", &ns()));
        assert!(eval("count_text == 7", &ns()));
        assert!(eval("count_text > 6", &ns()));
        assert!(eval("score >= 7.5", &ns()));
        assert!(eval("score < 8", &ns()));
        assert!(!eval("status > 1", &ns()));
        assert!(!eval("status <= 1", &ns()));
    }

    #[test]
    fn test_missing_reference_is_false() {
        assert!(!eval("missing", &ns()));
        assert!(!eval("missing.deep[3].path", &ns()));
        assert!(!eval("missing > 0", &ns()));
        assert!(eval("missing == null", &ns()));
        assert!(eval("nothing == null", &ns()));
        assert!(!eval("missing == 0", &ns()));
    }

    #[test]
    fn test_truthiness() {
        assert!(eval("enabled", &ns()));
        assert!(eval("user.roles", &ns()));
        assert!(!eval("empty", &ns()));
        assert!(!eval("zero", &ns()));
        assert!(!eval("nothing", &ns()));
    }

    #[test]
    fn test_filters_and_regex_on_left() {
        assert!(eval("user.email | lower == 'ada@corp.com'", &ns()));
        assert!(eval("user.roles | length > 0", &ns()));
        assert!(eval("user.email =~ '@Corp'", &ns()));
        assert!(!eval("user.email =~ '^bob'", &ns()));
        assert!(eval("{{ count }} == 7", &ns()));
    }

    #[test]
    fn test_malformed_filter_degrades_to_false() {
        assert!(!eval("status | shout", &ns()));
        assert!(!eval("status | shout == 'FAILED'", &ns()));
        assert!(eval("status | shout != 'FAILED'", &ns()));
    }

    #[test]
    fn test_loose_equals_rules() {
        assert!(loose_equals(None, Some(&Value::Null)));
        assert!(loose_equals(Some(&json!(1)), Some(&json!(true))));
        assert!(loose_equals(Some(&json!("0")), Some(&json!(false))));
        assert!(!loose_equals(Some(&json!("abc")), Some(&json!(0))));
        assert!(loose_equals(Some(&json!(1.0)), Some(&json!(1))));
        assert!(loose_equals(Some(&json!([1, 2])), Some(&json!([1, 2]))));
        assert!(!loose_equals(Some(&json!([1])), Some(&json!(true))));
        assert!(!loose_equals(Some(&json!({})), Some(&json!("{}"))));
    }
}
