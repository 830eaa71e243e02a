//! Criteria expressions compiled from filters and evaluated against entities.

use crate::entity::Entity;
use crate::error::AccessError;
use crate::query::operator::contains;
use crate::query::{Combinator, Filter, FilterTriple, Operator};
use crate::value::FieldValue;
use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Comparison {
        op: Operator,
        field: String,
        value: FieldValue,
    },
    IsNull {
        field: String,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn from_triple(t: &FilterTriple) -> Self {
        match t.op {
            Operator::IsNull => Expr::IsNull { field: t.field.clone() },
            op => Expr::Comparison {
                op,
                field: t.field.clone(),
                value: t.value.clone(),
            },
        }
    }

    /// Number of leaf comparisons.
    pub fn len(&self) -> usize {
        match self {
            Expr::And(children) | Expr::Or(children) => children.iter().map(Expr::len).sum(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `entity` satisfies the expression. Membership is strict here:
    /// `1` is not in `[1.0]`.
    pub fn matches(&self, entity: &dyn Entity) -> Result<bool, AccessError> {
        match self {
            Expr::And(children) => {
                for c in children {
                    if !c.matches(entity)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expr::Or(children) => {
                for c in children {
                    if c.matches(entity)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::IsNull { field } => Ok(read(entity, field)?.is_null()),
            Expr::Comparison { op, field, value } => {
                let left = read(entity, field)?;
                Ok(match op {
                    Operator::Eq => left.identical(value),
                    Operator::Neq => !left.identical(value),
                    Operator::Lt => left.compare(value) == Some(Ordering::Less),
                    Operator::Lte => matches!(left.compare(value), Some(Ordering::Less | Ordering::Equal)),
                    Operator::Gt => left.compare(value) == Some(Ordering::Greater),
                    Operator::Gte => matches!(left.compare(value), Some(Ordering::Greater | Ordering::Equal)),
                    Operator::In => contains(value, &left, FieldValue::identical)?,
                    Operator::Nin => !contains(value, &left, FieldValue::identical)?,
                    Operator::IsNull => left.is_null(),
                })
            }
        }
    }
}

fn read(entity: &dyn Entity, field: &str) -> Result<FieldValue, AccessError> {
    entity.get_field(field).ok_or_else(|| AccessError::UnknownField {
        entity: entity.entity_name().to_string(),
        field: field.to_string(),
    })
}

/// One node per triple; a single node stands alone, several are joined.
pub fn compile(filter: &Filter) -> Result<Expr, AccessError> {
    match filter {
        Filter::Single(t) => Ok(Expr::from_triple(t)),
        Filter::Combined(combinator, triples) => {
            let mut nodes: Vec<Expr> = triples.iter().map(Expr::from_triple).collect();
            match nodes.len() {
                0 => Err(AccessError::ExpressionCountMismatch { expected: 1, actual: 0 }),
                1 => Ok(nodes.remove(0)),
                _ => Ok(match combinator {
                    Combinator::And => Expr::And(nodes),
                    Combinator::Or => Expr::Or(nodes),
                }),
            }
        }
    }
}
