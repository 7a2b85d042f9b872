// SPDX-License-Identifier: MIT

//! Literal operands and quote-aware scanning

use serde_json::{Number, Value};

/// Parse a quoted string, number, `true`, `false` or `null`
pub fn parse_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' || first == b'"') && first == last {
            let inner = &text[1..text.len() - 1];
            let quote = first as char;
            return Some(Value::String(inner.replace(&format!("\\{}", quote), &quote.to_string())));
        }
    }

    match text {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" => return Some(Value::Null),
        _ => {}
    }

    parse_number(text)
}

/// Strict numeric literal; rejects `nan`, `inf` and friends
pub fn parse_number(text: &str) -> Option<Value> {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    let starts_numeric = digits
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '.');
    if !starts_numeric || !digits.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Byte offset of `needle` outside quotes, parentheses and brackets
pub fn find_top_level(text: &str, needle: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => depth -= 1,
                _ if depth == 0 && text[i..].starts_with(needle) => return Some(i),
                _ => {}
            },
        }
    }
    None
}
