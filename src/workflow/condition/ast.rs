// SPDX-License-Identifier: MIT

//! Parsed form of a condition string

use serde_json::Value;

/// A single condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `left op right`; the right side is always a literal
    Compare {
        left: String,
        op: CompareOp,
        right: Value,
    },
    /// Bare reference, tested for truthiness
    Truthy(String),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// ==
    Eq,
    /// !=
    NotEq,
    /// >=
    Gte,
    /// <=
    Lte,
    /// >
    Gt,
    /// <
    Lt,
}

impl CompareOp {
    /// Scan order: the first operator present in a condition wins
    pub const PRIORITY: [CompareOp; 6] = [
        CompareOp::Eq,
        CompareOp::NotEq,
        CompareOp::Gte,
        CompareOp::Lte,
        CompareOp::Gt,
        CompareOp::Lt,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op_display() {
        let rendered: Vec<String> = CompareOp::PRIORITY.iter().map(|op| op.to_string()).collect();
        assert_eq!(rendered, vec!["==", "!=", ">=", "<=", ">", "<"]);
    }
}
