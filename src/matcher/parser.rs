//! Matcher expression parser using nom.

use super::ast::*;
use crate::core::{BridgeError, EnvelopeAttr, FieldRef, Result};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{cut, map, map_res, not, opt, recognize, value as nom_value},
    error::{ErrorKind, FromExternalError},
    multi::many0,
    number::complete::double,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

/// Parser error carrying an optional message from a failed regex compile.
#[derive(Debug)]
struct ParseError<'a> {
    input: &'a str,
    message: Option<String>,
}

impl<'a> nom::error::ParseError<&'a str> for ParseError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        ParseError {
            input,
            message: None,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<'a> FromExternalError<&'a str, regex::Error> for ParseError<'a> {
    fn from_external_error(input: &'a str, _kind: ErrorKind, e: regex::Error) -> Self {
        ParseError {
            input,
            message: Some(format!("invalid regex: {}", e)),
        }
    }
}

type PResult<'a, T> = IResult<&'a str, T, ParseError<'a>>;

/// Parse a matcher expression into an AST
pub fn parse_expression(input: &str) -> Result<Expr> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::matcher("empty matcher expression"));
    }

    let expr = match terminated(expression, multispace0)(trimmed) {
        Ok(("", expr)) => expr,
        Ok((remaining, _)) => {
            return Err(BridgeError::matcher(format!(
                "unexpected input after expression in '{}': '{}'",
                trimmed, remaining
            )));
        },
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            let detail = e
                .message
                .unwrap_or_else(|| format!("unexpected input at '{}'", e.input));
            return Err(BridgeError::matcher(format!(
                "failed to parse '{}': {}",
                trimmed, detail
            )));
        },
        Err(nom::Err::Incomplete(_)) => {
            return Err(BridgeError::matcher(format!("incomplete expression '{}'", trimmed)));
        },
    };

    validate(&expr)?;
    Ok(expr)
}

/// Regex operators need a regex literal and regex literals need a regex operator.
fn validate(expr: &Expr) -> Result<()> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Comparison { field, op, value } => {
            let is_regex_value = matches!(value, Value::Regex(_));
            if op.is_regex() != is_regex_value {
                return Err(BridgeError::matcher(format!(
                    "operator {} cannot be used with {} on {}",
                    op, value, field
                )));
            }
            if matches!(value, Value::Nil) && !matches!(op, Operator::Eq | Operator::NotEq) {
                return Err(BridgeError::matcher(format!(
                    "NIL only supports == and !=, got {} on {}",
                    op, field
                )));
            }
            Ok(())
        },
        Expr::Logical { left, right, .. } => {
            validate(left)?;
            validate(right)
        },
        Expr::Group(inner) => validate(inner),
    }
}

fn expression(input: &str) -> PResult<'_, Expr> {
    logical_or(input)
}

/// Parse logical OR expressions
fn logical_or(input: &str) -> PResult<'_, Expr> {
    let (input, first) = logical_and(input)?;

    let (input, rest) = many0(preceded(
        preceded(multispace0, tag("||")),
        preceded(multispace0, logical_and),
    ))(input)?;

    Ok((
        input,
        rest.into_iter().fold(first, |acc, right| Expr::Logical {
            op: LogicalOp::Or,
            left: Box::new(acc),
            right: Box::new(right),
        }),
    ))
}

/// Parse logical AND expressions
fn logical_and(input: &str) -> PResult<'_, Expr> {
    let (input, first) = primary(input)?;

    let (input, rest) = many0(preceded(
        preceded(multispace0, tag("&&")),
        preceded(multispace0, primary),
    ))(input)?;

    Ok((
        input,
        rest.into_iter().fold(first, |acc, right| Expr::Logical {
            op: LogicalOp::And,
            left: Box::new(acc),
            right: Box::new(right),
        }),
    ))
}

fn primary(input: &str) -> PResult<'_, Expr> {
    preceded(multispace0, alt((grouped, comparison, literal)))(input)
}

fn grouped(input: &str) -> PResult<'_, Expr> {
    map(
        delimited(char('('), preceded(multispace0, expression), preceded(multispace0, char(')'))),
        |expr| Expr::Group(Box::new(expr)),
    )(input)
}

fn literal(input: &str) -> PResult<'_, Expr> {
    alt((
        nom_value(Expr::Literal(true), keyword("TRUE")),
        nom_value(Expr::Literal(false), keyword("FALSE")),
    ))(input)
}

fn comparison(input: &str) -> PResult<'_, Expr> {
    map(
        tuple((field_ref, preceded(multispace0, operator), preceded(multispace0, value))),
        |(field, op, value)| Expr::Comparison { field, op, value },
    )(input)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// A word that is not directly followed by more identifier characters.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    terminated(tag(word), not(satisfy(is_ident_char)))
}

/// `Fields[name]`, an envelope header name, or a bare field reference
fn field_ref(input: &str) -> PResult<'_, FieldRef> {
    alt((
        map(
            delimited(tag("Fields["), take_while1(|c| c != ']'), char(']')),
            |name: &str| FieldRef::Field(name.to_string()),
        ),
        map(
            recognize(pair(opt(char('@')), take_while1(is_ident_char))),
            |name: &str| {
                EnvelopeAttr::from_header_name(name)
                    .map_or_else(|| FieldRef::parse(name), FieldRef::Envelope)
            },
        ),
    ))(input)
}

fn operator(input: &str) -> PResult<'_, Operator> {
    alt((
        nom_value(Operator::Matches, tag("=~")),
        nom_value(Operator::NotMatches, tag("!~")),
        nom_value(Operator::Eq, tag("==")),
        nom_value(Operator::NotEq, tag("!=")),
        nom_value(Operator::Gte, tag(">=")),
        nom_value(Operator::Lte, tag("<=")),
        nom_value(Operator::Gt, tag(">")),
        nom_value(Operator::Lt, tag("<")),
    ))(input)
}

fn value(input: &str) -> PResult<'_, Value> {
    alt((
        map(regex_literal, Value::Regex),
        map(quoted_string, Value::String),
        nom_value(Value::Nil, keyword("NIL")),
        nom_value(Value::Boolean(true), keyword("TRUE")),
        nom_value(Value::Boolean(false), keyword("FALSE")),
        map(double, Value::Number),
    ))(input)
}

/// Single or double quoted string; may be empty
fn quoted_string(input: &str) -> PResult<'_, String> {
    map(
        alt((
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        )),
        |s: &str| s.to_string(),
    )(input)
}

/// `/pattern/`, where `\/` stands for a literal slash
fn regex_literal(input: &str) -> PResult<'_, Pattern> {
    preceded(
        char('/'),
        cut(map_res(terminated(regex_body, char('/')), |source: String| {
            Pattern::new(&source)
        })),
    )(input)
}

fn regex_body(input: &str) -> PResult<'_, String> {
    let mut source = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '/' => return Ok((&input[i..], source)),
            '\\' => match chars.next() {
                Some((_, '/')) => source.push('/'),
                Some((_, escaped)) => {
                    source.push('\\');
                    source.push(escaped);
                },
                None => break,
            },
            c => source.push(c),
        }
    }
    Err(nom::Err::Error(ParseError {
        input,
        message: Some("unterminated regex".to_string()),
    }))
}
