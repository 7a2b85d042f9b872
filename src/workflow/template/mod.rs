// SPDX-License-Identifier: MIT

//! `{{ expr }}` template resolution against a run's namespace
//!
//! Rendering goes through a shared `minijinja` environment with chainable
//! undefined values, so missing data renders as empty/`null` and only
//! malformed syntax is an error. A string made of a single placeholder yields
//! the typed value; mixed text yields a string.
//!
//! On top of Jinja syntax, `left =~ 'regex'` (or `/regex/`) inside a
//! placeholder tests `left` against a regular expression.

mod filters;

use crate::workflow::condition::{find_top_level, parse_literal};
use crate::workflow::context::ExecutionContext;
use minijinja::{Environment, ErrorKind};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::borrow::Cow;
use thiserror::Error;

static ENV: Lazy<Environment<'static>> = Lazy::new(filters::environment);

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("placeholder pattern is valid"));

/// Malformed template syntax or a failing filter
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    #[error("Template syntax error: {0}")]
    Syntax(String),

    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("Invalid filter arguments: {0}")]
    BadArguments(String),

    #[error("Template evaluation failed: {0}")]
    Evaluation(String),
}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        let message = err
            .detail()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        match err.kind() {
            ErrorKind::SyntaxError | ErrorKind::BadEscape => Self::Syntax(message),
            ErrorKind::UnknownFilter | ErrorKind::UnknownTest => Self::UnknownFilter(message),
            ErrorKind::MissingArgument | ErrorKind::TooManyArguments => Self::BadArguments(message),
            _ => Self::Evaluation(message),
        }
    }
}

/// Resolve every template in `value` against the context's namespace
pub fn resolve(value: &Value, ctx: &ExecutionContext) -> Result<Value, TemplateError> {
    resolve_in(value, &ctx.namespace())
}

/// Resolve every template in `value` against a prepared namespace
pub fn resolve_in(value: &Value, namespace: &Value) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => render_str(s, namespace),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_in(item, namespace))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_in(item, namespace)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Render one template string.
///
/// `"{{ user.age }}"` returns the number itself; `"age: {{ user.age }}"`
/// returns a string.
pub fn render_str(template: &str, namespace: &Value) -> Result<Value, TemplateError> {
    if !template.contains("{{") && !template.contains("{%") {
        return Ok(Value::String(template.to_string()));
    }

    if let Some(expr) = sole_placeholder(template) {
        return Ok(evaluate_expression(expr, namespace)?.unwrap_or(Value::Null));
    }

    let source = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        format!("{{{{{}}}}}", rewrite_regex_operator(&caps[1]))
    });
    Ok(Value::String(ENV.render_str(&source, namespace)?))
}

/// Evaluate one expression (the text between `{{` and `}}`); `None` is undefined
pub fn evaluate_expression(expr: &str, namespace: &Value) -> Result<Option<Value>, TemplateError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(TemplateError::Syntax("empty expression".to_string()));
    }
    let expr = rewrite_regex_operator(expr);
    let value = ENV.compile_expression(&expr)?.eval(namespace)?;
    Ok(filters::to_json(&value))
}

/// Body of a template that is exactly one placeholder, whitespace markers removed
fn sole_placeholder(template: &str) -> Option<&str> {
    let body = template.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    if body.contains("{{") || body.contains("}}") || body.contains("{%") {
        return None;
    }
    Some(body.trim().trim_start_matches('-').trim_end_matches('-'))
}

/// `left =~ pattern` becomes `(left) is matching('pattern')`
fn rewrite_regex_operator(body: &str) -> Cow<'_, str> {
    let Some(at) = find_top_level(body, "=~") else {
        return Cow::Borrowed(body);
    };

    let (lead, left) = match body[..at].trim().strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", body[..at].trim()),
    };
    let (right, tail) = match body[at + 2..].trim().strip_suffix('-') {
        Some(rest) => (rest.trim(), "-"),
        None => (body[at + 2..].trim(), ""),
    };

    let pattern = if right.len() >= 2 && right.starts_with('/') && right.ends_with('/') {
        right[1..right.len() - 1].to_string()
    } else {
        match parse_literal(right) {
            Some(Value::String(pattern)) => pattern,
            _ => right.to_string(),
        }
    };
    let quoted = pattern.replace('\\', "\\\\").replace('\'', "\\'");
    Cow::Owned(format!("{} ({}) is matching('{}') {}", lead, left.trim(), quoted, tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn ns() -> Value {
        json!({
            "name": "Ada",
            "user": { "age": 36, "tags": ["admin", "ops"], "email": "ADA@Example.com" },
            "items": [ { "sku": "a", "qty": 2 }, { "sku": "b", "qty": 0 } ],
            "nothing": null,
            "inputs": { "name": "Ada" }
        })
    }

    #[test]
    fn test_no_templates_is_identity() {
        let value = json!({
            "a": [1, 2.5, true, null, "plain text"],
            "b": { "c": "still plain", "d": {} }
        });
        assert_eq!(resolve_in(&value, &ns()).unwrap(), value);
    }

    #[test]
    fn test_single_placeholder_keeps_type() {
        assert_eq!(render_str("{{ user.age }}", &ns()).unwrap(), json!(36));
        assert_eq!(render_str("{{user.tags}}", &ns()).unwrap(), json!(["admin", "ops"]));
        assert_eq!(render_str(" {{ missing.path }} ", &ns()).unwrap(), Value::Null);
        assert_eq!(render_str("{{- items[0] -}}", &ns()).unwrap(), json!({"sku": "a", "qty": 2}));
    }

    #[test]
    fn test_interpolation_stringifies() {
        assert_eq!(
            render_str("Hi {{ name }}, age {{ user.age }}", &ns()).unwrap(),
            json!("Hi Ada, age 36")
        );
        assert_eq!(
            render_str("[{{ missing }}|{{ nothing }}|{{ missing.deep.path }}]", &ns()).unwrap(),
            json!("[||]")
        );
        assert_eq!(
            render_str("tags={{ user.tags }}", &ns()).unwrap(),
            json!(r#"tags=["admin","ops"]"#)
        );
        assert_eq!(render_str("Hi {{ name }}\n", &ns()).unwrap(), json!("Hi Ada\n"));
    }

    #[test]
    fn test_nested_structures_resolved() {
        let value = json!({
            "to": "{{ user.email | lower }}",
            "list": ["{{ items[0].sku }}", "{{ items[1].qty }}"],
            "count": 3
        });
        assert_eq!(
            resolve_in(&value, &ns()).unwrap(),
            json!({"to": "ada@example.com", "list": ["a", 0], "count": 3})
        );
    }

    #[test]
    fn test_resolve_uses_context_precedence() {
        let mut inputs = Map::new();
        inputs.insert("x".to_string(), json!(1));
        let mut ctx = ExecutionContext::new("wf", inputs);
        ctx.record_output("x", json!(2));

        assert_eq!(resolve(&json!("{{ x }}"), &ctx).unwrap(), json!(2));
        assert_eq!(resolve(&json!("{{ inputs.x }}"), &ctx).unwrap(), json!(1));
    }

    #[test]
    fn test_blocks() {
        let template = "{% for t in user.tags %}{{ loop.index }}:{{ t }}{% if not loop.last %},{% endif %}{% endfor %}";
        assert_eq!(render_str(template, &ns()).unwrap(), json!("1:admin,2:ops"));

        let template = "{% if user.age >= 40 %}senior{% elif user.age >= 30 %}mid{% else %}junior{% endif %}";
        assert_eq!(render_str(template, &ns()).unwrap(), json!("mid"));

        let template = "{% for x in missing %}x{% endfor %}done";
        assert_eq!(render_str(template, &ns()).unwrap(), json!("done"));
    }

    #[test]
    fn test_malformed_syntax_errors() {
        assert!(matches!(render_str("{{ name ", &ns()), Err(TemplateError::Syntax(_))));
        assert!(matches!(render_str("{{ }}", &ns()), Err(TemplateError::Syntax(_))));
        assert!(matches!(
            render_str("{{ name | shout }}", &ns()),
            Err(TemplateError::UnknownFilter(_))
        ));
        assert!(matches!(
            render_str("{% if name %}open", &ns()),
            Err(TemplateError::Syntax(_))
        ));
        assert!(matches!(
            render_str("a {% frobnicate %} b", &ns()),
            Err(TemplateError::Syntax(_))
        ));
    }

    #[test]
    fn test_regex_operator() {
        assert_eq!(
            render_str("{{ user.email =~ '@example\\.com$' }}", &ns()).unwrap(),
            json!(false)
        );
        assert_eq!(
            render_str("{{ user.email | lower =~ /@example\\.com$/ }}", &ns()).unwrap(),
            json!(true)
        );
        assert_eq!(
            render_str("match={{ name =~ '^A' }}", &ns()).unwrap(),
            json!("match=true")
        );
        assert_eq!(evaluate_expression("missing =~ 'x'", &ns()).unwrap(), Some(json!(false)));
        assert!(matches!(
            render_str("{{ name =~ '(' }}", &ns()),
            Err(TemplateError::Evaluation(_))
        ));
    }

    #[test]
    fn test_rewrite_regex_operator() {
        assert_eq!(rewrite_regex_operator("a | b"), "a | b");
        assert_eq!(
            rewrite_regex_operator(" x =~ /it's/ "),
            " (x) is matching('it\\'s') "
        );
    }
}
