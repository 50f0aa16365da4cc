//! Compact text form of search criteria, used to carry a search through
//! links and forms.
//!
//! ```text
//! color=or("red","blue");size=in(1,*);state=not("draft");owner=#12
//! ```
//!
//! Literals are typed: `"text"` (with `\"` and `\\` escapes), integers,
//! `true`/`false`, `d"<rfc3339>"` dates and `#<id>` references. Range bounds
//! may be `*` for "unbounded".

use std::fmt;
use chrono::{DateTime, Utc};
use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, tag, take_while1};
use nom::character::complete::{char, i64 as parse_i64, multispace0, u64 as parse_u64};
use nom::combinator::{all_consuming, map, map_res, opt, value};
use nom::multi::separated_list0;
use nom::sequence::{delimited, preceded, separated_pair};
use nom::{IResult, Parser};
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::value::IndexKey;
use crate::query::criteria::{Criteria, Criterion};
use crate::query::operator::Operator;

/// Parse packed criteria. The empty string is the empty criteria.
pub fn parse_criteria(input: &str) -> Result<Criteria> {
    match all_consuming(criteria).parse(input) {
        Ok((_, clauses)) => {
            let mut parsed = Criteria::new();
            for (attribute, criterion) in clauses {
                parsed.insert(attribute, criterion);
            }
            Ok(parsed)
        }
        Err(err) => Err(Error::new(
            ErrorKind::Parse,
            format!("invalid search parameters '{}': {}", input, err),
        )),
    }
}

/// Inverse of `parse_criteria`. Attribute names are limited to letters,
/// digits, `_` and `.`.
pub fn pack(criteria: &Criteria) -> Result<String> {
    let mut clauses = Vec::with_capacity(criteria.len());
    for (attribute, criterion) in criteria.iter() {
        if attribute.is_empty() || !attribute.chars().all(is_attribute_char) {
            return Err(Error::invalid_value(format!(
                "attribute name '{}' cannot be packed",
                attribute
            )));
        }
        clauses.push(format!("{}={}", attribute, criterion));
    }
    Ok(clauses.join(";"))
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Criterion::Value(key) => write!(f, "{}", key),
            Criterion::Op(op) => write!(f, "{}", op),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operator::Or(values) | Operator::And(values) | Operator::Not(values) => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{}({})", self.name(), values.join(","))
            }
            Operator::In { lower, upper } => {
                let bound = |key: &Option<IndexKey>| key.as_ref().map_or("*".to_string(), ToString::to_string);
                write!(f, "in({},{})", bound(lower), bound(upper))
            }
        }
    }
}

fn criteria(i: &str) -> IResult<&str, Vec<(&str, Criterion)>> {
    delimited(multispace0, separated_list0(punct(';'), clause), multispace0).parse(i)
}

fn clause(i: &str) -> IResult<&str, (&str, Criterion)> {
    separated_pair(attribute, punct('='), expr).parse(i)
}

fn is_attribute_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn attribute(i: &str) -> IResult<&str, &str> {
    take_while1(is_attribute_char).parse(i)
}

fn expr(i: &str) -> IResult<&str, Criterion> {
    alt((
        map(preceded(tag("or"), args), |values| Criterion::Op(Operator::Or(values))),
        map(preceded(tag("and"), args), |values| Criterion::Op(Operator::And(values))),
        map(preceded(tag("not"), args), |values| Criterion::Op(Operator::Not(values))),
        map(
            preceded(tag("in"), delimited(punct('('), separated_pair(bound, punct(','), bound), punct(')'))),
            |(lower, upper)| Criterion::Op(Operator::In { lower, upper }),
        ),
        map(literal, Criterion::Value),
    ))
    .parse(i)
}

fn args(i: &str) -> IResult<&str, Vec<IndexKey>> {
    delimited(punct('('), separated_list0(punct(','), literal), punct(')')).parse(i)
}

fn bound(i: &str) -> IResult<&str, Option<IndexKey>> {
    alt((value(None, char('*')), map(literal, Some))).parse(i)
}

fn literal(i: &str) -> IResult<&str, IndexKey> {
    alt((
        map(quoted, IndexKey::Text),
        map(preceded(char('d'), map_res(quoted, |raw: String| parse_date(&raw))), IndexKey::Date),
        map(preceded(char('#'), parse_u64), IndexKey::Ref),
        value(IndexKey::Boolean(true), tag("true")),
        value(IndexKey::Boolean(false), tag("false")),
        map(parse_i64, IndexKey::Integer),
    ))
    .parse(i)
}

fn parse_date(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|d| d.with_timezone(&Utc))
}

/// Double-quoted string with `\"` and `\\` escapes.
fn quoted(i: &str) -> IResult<&str, String> {
    let escapes = alt((value("\\", tag("\\")), value("\"", tag("\""))));
    delimited(
        char('"'),
        map(opt(escaped_transform(is_not("\"\\"), '\\', escapes)), |text: Option<String>| {
            text.unwrap_or_default()
        }),
        char('"'),
    )
    .parse(i)
}

fn punct<'a>(c: char) -> impl Parser<&'a str, Output = char, Error = nom::error::Error<&'a str>> {
    delimited(multispace0, char(c), multispace0)
}
