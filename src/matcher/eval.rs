//! Evaluation of parsed matcher expressions against records.

use super::ast::*;
use crate::core::{FieldValue, Message};
use std::cmp::Ordering;

/// Evaluate an expression. Missing fields and type mismatches are false.
pub fn evaluate(expr: &Expr, message: &Message) -> bool {
    match expr {
        Expr::Literal(b) => *b,
        Expr::Comparison { field, op, value } => {
            let resolved = message.resolve(field);
            compare(resolved.as_deref(), *op, value)
        },
        Expr::Logical { op: LogicalOp::And, left, right } => {
            evaluate(left, message) && evaluate(right, message)
        },
        Expr::Logical { op: LogicalOp::Or, left, right } => {
            evaluate(left, message) || evaluate(right, message)
        },
        Expr::Group(inner) => evaluate(inner, message),
    }
}

fn compare(field: Option<&FieldValue>, op: Operator, value: &Value) -> bool {
    if let Value::Nil = value {
        return match op {
            Operator::Eq => field.is_none(),
            Operator::NotEq => field.is_some(),
            _ => false,
        };
    }

    let Some(field) = field else {
        return false;
    };

    match (field, value) {
        (FieldValue::String(s), Value::Regex(pattern)) => match op {
            Operator::Matches => pattern.is_match(s),
            Operator::NotMatches => !pattern.is_match(s),
            _ => false,
        },
        (FieldValue::String(s), Value::String(expected)) => ordered(s.as_str().cmp(expected), op),
        (FieldValue::Bool(b), Value::Boolean(expected)) => match op {
            Operator::Eq => b == expected,
            Operator::NotEq => b != expected,
            _ => false,
        },
        (field, Value::Number(expected)) => field
            .as_f64()
            .and_then(|actual| actual.partial_cmp(expected))
            .is_some_and(|ordering| ordered(ordering, op)),
        _ => false,
    }
}

fn ordered(ordering: Ordering, op: Operator) -> bool {
    match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::NotEq => ordering != Ordering::Equal,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Gte => ordering != Ordering::Less,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Lte => ordering != Ordering::Greater,
        Operator::Matches | Operator::NotMatches => false,
    }
}
