// SPDX-License-Identifier: MIT

//! Template environment and the filters layered over minijinja's builtins
//!
//! Builtins cover `first last join replace int float string abs round`. The
//! filters here either have no builtin or must treat undefined and `null`
//! the way the condition evaluator does.

use crate::workflow::condition::truthy;
use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind, Output, State, UndefinedBehavior};
use regex::Regex;
use serde_json::Value as Json;
use std::fmt::Write;

pub(super) fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.set_keep_trailing_newline(true);
    env.set_formatter(format_value);

    env.add_filter("upper", |value: Value| map_str(value, |s| s.to_uppercase()));
    env.add_filter("lower", |value: Value| map_str(value, |s| s.to_lowercase()));
    env.add_filter("trim", |value: Value| map_str(value, |s| s.trim().to_string()));
    env.add_filter("capitalize", |value: Value| map_str(value, capitalize));
    env.add_filter("length", length);
    env.add_filter("count", length);
    env.add_filter("default", default);
    env.add_filter("split", split);
    env.add_filter("keys", keys);
    env.add_filter("values", values);
    env.add_filter("bool", to_bool);
    env.add_filter("not", |value: Value| !truthy(to_json(&value).as_ref()));
    env.add_filter("json", parse_json);
    env.add_filter("tojson", |value: Value| to_json(&value).unwrap_or(Json::Null).to_string());
    env.add_filter("match", matching);
    env.add_filter("regex_replace", regex_replace);
    env.add_filter("regex_search", regex_search);
    env.add_test("matching", matching);
    env
}

/// JSON view of a template value; undefined is `None`
pub(super) fn to_json(value: &Value) -> Option<Json> {
    if value.is_undefined() {
        return None;
    }
    serde_json::to_value(value).ok()
}

/// Interpolated text: undefined and `null` are empty, containers are compact JSON
fn stringify(value: &Value) -> String {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => String::new(),
        ValueKind::String => value.as_str().unwrap_or_default().to_string(),
        ValueKind::Seq | ValueKind::Map => to_json(value).map(|j| j.to_string()).unwrap_or_default(),
        _ => value.to_string(),
    }
}

fn format_value(out: &mut Output<'_>, _state: &State<'_, '_>, value: &Value) -> Result<(), Error> {
    out.write_str(&stringify(value)).map_err(Error::from)
}

fn is_missing(value: &Value) -> bool {
    value.is_undefined() || value.is_none()
}

fn map_str(value: Value, f: impl FnOnce(String) -> String) -> Value {
    if is_missing(&value) {
        value
    } else {
        Value::from(f(stringify(&value)))
    }
}

fn capitalize(s: String) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => s,
    }
}

fn length(value: Value) -> usize {
    match value.kind() {
        ValueKind::String => value.as_str().map_or(0, |s| s.chars().count()),
        ValueKind::Seq | ValueKind::Map => value.len().unwrap_or(0),
        _ => 0,
    }
}

/// `default(x)` replaces undefined/null; `default(x, true)` also replaces falsy values
fn default(value: Value, fallback: Value, falsy_too: Option<bool>) -> Value {
    let replace = is_missing(&value)
        || (falsy_too.unwrap_or(false) && !truthy(to_json(&value).as_ref()));
    if replace {
        fallback
    } else {
        value
    }
}

/// Whitespace split without a separator
fn split(value: Value, separator: Option<String>) -> Value {
    let Some(text) = value.as_str() else {
        return value;
    };
    let parts: Vec<&str> = match separator.as_deref() {
        None | Some("") => text.split_whitespace().collect(),
        Some(sep) => text.split(sep).collect(),
    };
    Value::from_serialize(parts)
}

fn keys(value: Value) -> Value {
    match to_json(&value) {
        Some(Json::Object(map)) => Value::from_serialize(map.keys().collect::<Vec<_>>()),
        _ => Value::UNDEFINED,
    }
}

fn values(value: Value) -> Value {
    match to_json(&value) {
        Some(Json::Object(map)) => Value::from_serialize(map.values().collect::<Vec<_>>()),
        _ => Value::UNDEFINED,
    }
}

fn to_bool(value: Value) -> bool {
    match value.as_str() {
        Some(s) => !matches!(s.trim().to_lowercase().as_str(), "" | "false" | "no" | "off" | "0"),
        None => truthy(to_json(&value).as_ref()),
    }
}

/// Parse a JSON string; other values pass through
fn parse_json(value: Value) -> Value {
    match value.as_str() {
        Some(text) => serde_json::from_str::<Json>(text)
            .map(Value::from_serialize)
            .unwrap_or(Value::UNDEFINED),
        None => value,
    }
}

fn compile(pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid regex '{}': {}", pattern, e),
        )
    })
}

fn matching(value: Value, pattern: String) -> Result<bool, Error> {
    let regex = compile(&pattern)?;
    Ok(!is_missing(&value) && regex.is_match(&stringify(&value)))
}

fn regex_replace(value: Value, pattern: String, replacement: String) -> Result<Value, Error> {
    let regex = compile(&pattern)?;
    Ok(map_str(value, |s| regex.replace_all(&s, replacement.as_str()).into_owned()))
}

/// First capture group, or the whole match when the pattern has none
fn regex_search(value: Value, pattern: String) -> Result<Value, Error> {
    let regex = compile(&pattern)?;
    if is_missing(&value) {
        return Ok(Value::UNDEFINED);
    }
    let text = stringify(&value);
    Ok(regex
        .captures(&text)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|found| Value::from(found.as_str()))
        .unwrap_or(Value::UNDEFINED))
}
