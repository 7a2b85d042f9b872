// SPDX-License-Identifier: MIT

//! Condition parser
//!
//! The grammar is one binary comparison at most:
//! - `status == 'failed'`
//! - `steps.fetch.count >= 10`
//! - `user.email | lower =~ '@corp'` (no operator: truthiness)
//!
//! Operators are looked up in fixed priority order and the condition is split
//! at the first occurrence of the first one present. Occurrences inside quotes
//! are ignored.

use super::ast::{CompareOp, Condition};
use super::literal::{find_top_level, parse_literal};
use serde_json::Value;

/// Parse a condition string. Never fails: anything without an operator is a
/// truthiness check.
pub fn parse(input: &str) -> Condition {
    let input = input.trim();

    for op in CompareOp::PRIORITY {
        if let Some(at) = find_operator(input, op) {
            let left = input[..at].trim().to_string();
            let right = parse_right(&input[at + op.symbol().len()..]);
            return Condition::Compare { left, op, right };
        }
    }

    Condition::Truthy(input.to_string())
}

fn find_operator(input: &str, op: CompareOp) -> Option<usize> {
    // Text after a regex operator is a pattern, not a comparison
    let limit = find_top_level(input, "=~").unwrap_or(input.len());
    find_top_level(&input[..limit], op.symbol())
}

/// Literal-parse the right operand; anything else is a bare string
fn parse_right(text: &str) -> Value {
    let text = text.trim();
    parse_literal(text).unwrap_or_else(|| Value::String(text.to_string()))
}
