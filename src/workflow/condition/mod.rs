// SPDX-License-Identifier: MIT

//! Condition evaluation for step gating
//!
//! A step runs only when every one of its conditions holds. Conditions are
//! single comparisons or bare references:
//! - `status == 'failed'`
//! - `steps.fetch.total > 10`
//! - `user.email | lower =~ '@example.com$'`

mod ast;
mod evaluator;
mod literal;
mod parser;

pub use ast::{CompareOp, Condition};
pub use evaluator::{evaluate, loose_equals, to_number, truthy};
pub use literal::{find_top_level, parse_literal, parse_number};
pub use parser::parse;

use crate::workflow::context::ExecutionContext;
use serde_json::Value;

/// AND over every condition, stopping at the first false one
pub fn evaluate_all(conditions: &[String], ctx: &ExecutionContext) -> bool {
    if conditions.is_empty() {
        return true;
    }
    let namespace = ctx.namespace();
    conditions.iter().all(|c| {
        let holds = evaluate_in(c, &namespace);
        if !holds {
            log::debug!("Condition '{}' is false", c);
        }
        holds
    })
}

pub fn evaluate_one(condition: &str, ctx: &ExecutionContext) -> bool {
    evaluate_in(condition, &ctx.namespace())
}

/// Evaluate against a prepared namespace
pub fn evaluate_in(condition: &str, namespace: &Value) -> bool {
    evaluate(&parse(condition), namespace)
}
