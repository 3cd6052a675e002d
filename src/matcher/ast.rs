//! Abstract syntax tree for matcher expressions.

use crate::core::FieldRef;
use regex::Regex;
use std::fmt;

/// Matcher expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `TRUE` or `FALSE`
    Literal(bool),
    /// Simple comparison: field op value
    Comparison {
        /// Left-hand side
        field: FieldRef,
        /// Comparison operator
        op: Operator,
        /// Right-hand side
        value: Value,
    },
    /// Logical combination of expressions
    Logical {
        /// Combinator
        op: LogicalOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Parenthesized expression
    Group(Box<Expr>),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `=~`
    Matches,
    /// `!~`
    NotMatches,
}

impl Operator {
    /// True for `=~` and `!~`.
    pub fn is_regex(self) -> bool {
        matches!(self, Operator::Matches | Operator::NotMatches)
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Quoted string
    String(String),
    /// Numeric literal
    Number(f64),
    /// `TRUE` or `FALSE`
    Boolean(bool),
    /// Field presence test
    Nil,
    /// `/.../` literal
    Regex(Pattern),
}

/// A compiled regular expression literal.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile a regex literal.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Pattern)
    }

    /// Whether `haystack` matches.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }

    /// Source of the pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Matches => "=~",
            Operator::NotMatches => "!~",
        };
        f.write_str(op)
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "&&"),
            LogicalOp::Or => write!(f, "||"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "'{}'", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(true) => write!(f, "TRUE"),
            Value::Boolean(false) => write!(f, "FALSE"),
            Value::Nil => write!(f, "NIL"),
            Value::Regex(p) => write!(f, "/{}/", p.as_str().replace('/', "\\/")),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(true) => write!(f, "TRUE"),
            Expr::Literal(false) => write!(f, "FALSE"),
            Expr::Comparison { field, op, value } => {
                match field {
                    FieldRef::Envelope(attr) => write!(f, "{}", attr.header_name())?,
                    FieldRef::Field(name) => write!(f, "Fields[{}]", name)?,
                }
                write!(f, " {} {}", op, value)
            },
            Expr::Logical { op, left, right } => write!(f, "{} {} {}", left, op, right),
            Expr::Group(inner) => write!(f, "({})", inner),
        }
    }
}
