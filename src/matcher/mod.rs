//! Message matcher language.
//!
//! Rules select records with boolean expressions over envelope headers and
//! fields:
//!
//! ```text
//! Type == 'nginx.access' && (Fields[status] >= 500 || Hostname =~ /^edge-/)
//! ```
//!
//! Expressions are compiled once when rules are loaded. Comparisons against
//! a missing field, or between incompatible types, are false.

pub mod ast;
pub mod eval;
pub mod parser;

use crate::core::{BridgeError, Message, Result};
use std::fmt;
use std::str::FromStr;

pub use ast::{Expr, LogicalOp, Operator, Value};
pub use parser::parse_expression;

/// A boolean test over a record.
pub trait Predicate: Send + Sync + fmt::Debug {
    fn matches(&self, message: &Message) -> bool;
}

/// A compiled matcher expression
#[derive(Debug, Clone)]
pub struct Matcher {
    source: String,
    expr: Expr,
}

impl Matcher {
    /// Compile an expression string
    pub fn compile(source: &str) -> Result<Self> {
        let expr = parse_expression(source)?;
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    /// Expression as it was configured
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl Predicate for Matcher {
    fn matches(&self, message: &Message) -> bool {
        eval::evaluate(&self.expr, message)
    }
}

impl FromStr for Matcher {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Matcher::compile(s)
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
