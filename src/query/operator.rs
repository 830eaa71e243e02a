//! Filter operators and the small comparison algebra used by predicate filters.

use crate::error::AccessError;
use crate::value::FieldValue;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    IsNull,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::In => "in",
            Operator::Nin => "nin",
            Operator::IsNull => "isNull",
        }
    }

    /// Case-insensitive.
    pub fn parse(s: &str) -> Result<Self, AccessError> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "eq" => Operator::Eq,
            "neq" => Operator::Neq,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "in" => Operator::In,
            "nin" => Operator::Nin,
            "isnull" => Operator::IsNull,
            _ => return Err(AccessError::UnsupportedOperator(s.to_string())),
        })
    }

    /// `left op right`, with `left` the observed value and `right` the expected one.
    ///
    /// Equality is identity (same kind and value). `in`/`nin` test membership in a
    /// list with numeric kinds compared loosely. Values of kinds that do not order
    /// against each other never satisfy `lt`/`lte`/`gt`/`gte`.
    pub fn apply(&self, left: &FieldValue, right: &FieldValue) -> Result<bool, AccessError> {
        Ok(match self {
            Operator::Eq => left.identical(right),
            Operator::Neq => !left.identical(right),
            Operator::Lt => left.compare(right) == Some(Ordering::Less),
            Operator::Lte => matches!(left.compare(right), Some(Ordering::Less | Ordering::Equal)),
            Operator::Gt => left.compare(right) == Some(Ordering::Greater),
            Operator::Gte => matches!(left.compare(right), Some(Ordering::Greater | Ordering::Equal)),
            Operator::In => contains(right, left, FieldValue::loose_eq)?,
            Operator::Nin => !contains(right, left, FieldValue::loose_eq)?,
            Operator::IsNull => return Err(AccessError::UnsupportedOperator(self.as_str().to_string())),
        })
    }
}

pub(crate) fn contains(
    list: &FieldValue,
    needle: &FieldValue,
    eq: fn(&FieldValue, &FieldValue) -> bool,
) -> Result<bool, AccessError> {
    match list {
        FieldValue::List(items) => Ok(items.iter().any(|item| eq(needle, item))),
        other => Err(AccessError::TypeMismatch(format!(
            "membership needs a list, got {}",
            other
        ))),
    }
}

impl FromStr for Operator {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::parse(s)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply the operator named `op` between `left` and `right`.
pub fn apply_logical_operator(op: &str, left: &FieldValue, right: &FieldValue) -> Result<bool, AccessError> {
    Operator::parse(op)?.apply(left, right)
}
