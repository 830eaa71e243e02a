//! Filter triples and normalization of loosely shaped filter arguments.
//!
//! Accepted shapes, all equivalent:
//!
//! ```text
//! ("eq", "Status", 1)                      flat triple
//! (["eq", "Status", 1], ["neq", "Name", "Bob"])  list of triples
//! ([["eq", "Status", 1], ["neq", "Name", "Bob"]]) one list wrapping triples
//! ```
//!
//! A triple with fewer than three elements gets `eq` prepended unless it starts
//! with `isNull`.

use crate::error::AccessError;
use crate::query::Operator;
use crate::value::FieldValue;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub struct FilterTriple {
    pub op: Operator,
    pub field: String,
    pub value: FieldValue,
}

impl FilterTriple {
    pub fn new(op: Operator, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        FilterTriple {
            op,
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(Operator::Eq, field, value)
    }

    pub fn neq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(Operator::Neq, field, value)
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(Operator::IsNull, field, FieldValue::Null)
    }

    /// Parse one `[op, field, value]` / `[field, value]` / `["isNull", field]` array.
    pub fn from_json(v: &Value) -> Result<Self, AccessError> {
        let items = v
            .as_array()
            .ok_or_else(|| AccessError::MalformedFilter(format!("expected an array, got {}", v)))?;
        if items.is_empty() || items.len() > 3 {
            return Err(AccessError::MalformedFilter(format!(
                "expected 1 to 3 elements, got {}",
                items.len()
            )));
        }
        let starts_with_is_null = items[0]
            .as_str()
            .map(|s| s.eq_ignore_ascii_case("isNull"))
            .unwrap_or(false);
        let (op, rest) = if items.len() < 3 && !starts_with_is_null {
            (Operator::Eq, &items[..])
        } else {
            let op = items[0]
                .as_str()
                .ok_or_else(|| AccessError::MalformedFilter(format!("operator must be a string, got {}", items[0])))?;
            (Operator::parse(op)?, &items[1..])
        };
        let field = rest
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| AccessError::MalformedFilter(format!("missing field name in {}", v)))?;
        let value = rest.get(1).map(FieldValue::from_json).unwrap_or(FieldValue::Null);
        Ok(FilterTriple::new(op, field, value))
    }
}

/// How the expressions of a multi-triple filter are joined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn parse(s: &str) -> Result<Self, AccessError> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(Combinator::And),
            "or" => Ok(Combinator::Or),
            _ => Err(AccessError::UnsupportedOperator(s.to_string())),
        }
    }
}

/// Typed filter: one triple, or several joined uniformly.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Single(FilterTriple),
    Combined(Combinator, Vec<FilterTriple>),
}

impl Filter {
    /// One triple stays single regardless of the combinator.
    pub fn from_triples(combinator: Combinator, mut triples: Vec<FilterTriple>) -> Self {
        if triples.len() == 1 {
            if let Some(t) = triples.pop() {
                return Filter::Single(t);
            }
        }
        Filter::Combined(combinator, triples)
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

/// Canonical list of triples, or `None` when the arguments carry no filter.
/// Empty entries inside a list of triples are skipped.
pub fn normalize(args: &[Value]) -> Result<Option<Vec<FilterTriple>>, AccessError> {
    let Some(first) = args.first() else {
        return Ok(None);
    };
    if is_empty(first) {
        return Ok(None);
    }

    let nested;
    let wrapped;
    let triples: &[Value] = match first {
        Value::Array(inner) if args.len() == 1 && inner.iter().all(Value::is_array) => {
            nested = inner.clone();
            &nested
        }
        _ if !args.iter().all(Value::is_array) => {
            wrapped = vec![Value::Array(args.to_vec())];
            &wrapped
        }
        _ => args,
    };

    let out = triples
        .iter()
        .filter(|t| !is_empty(t))
        .map(FilterTriple::from_json)
        .collect::<Result<Vec<_>, _>>()?;
    if out.is_empty() {
        return Ok(None);
    }
    Ok(Some(out))
}
