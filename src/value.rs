//! Dynamic field values, identifiers and reference handles.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use crate::error::AccessError;
use crate::schema::FieldType;

/// A value held by (or written to) an entity field. Converts from serde_json::Value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
    /// JSON object payload; treated as an already-built object by the mutation engine.
    Json(Value),
    /// Unloaded handle to another entity.
    Ref(EntityRef),
}

impl FieldValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Array(items) => FieldValue::List(items.iter().map(FieldValue::from_json).collect()),
            Value::Object(_) => FieldValue::Json(v.clone()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::Number((*i).into()),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::List(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            FieldValue::Json(v) => v.clone(),
            FieldValue::Ref(r) => serde_json::json!({ "entity": r.entity, "id": r.id.to_json() }),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Objects and references are passed through untouched when resolving relationships.
    pub fn is_object(&self) -> bool {
        matches!(self, FieldValue::Json(_) | FieldValue::Ref(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_entity_ref(&self) -> Option<&EntityRef> {
        match self {
            FieldValue::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Strict equality: same kind and same value. A reference is identical to a
    /// scalar that equals its identifier.
    pub fn identical(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Ref(a), FieldValue::Ref(b)) => a == b,
            (FieldValue::Ref(r), scalar) | (scalar, FieldValue::Ref(r)) => {
                r.id.to_field_value().identical(scalar)
            }
            (FieldValue::Float(a), FieldValue::Float(b)) => a == b,
            (FieldValue::List(a), FieldValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.identical(y))
            }
            _ => self == other,
        }
    }

    /// Equality that lets integers and floats meet; used for membership tests.
    pub fn loose_eq(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Int(_) | FieldValue::Float(_), FieldValue::Int(_) | FieldValue::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => self.identical(other),
        }
    }

    /// Ordering between comparable values; `None` when the kinds do not compare.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Int(_) | FieldValue::Float(_), FieldValue::Int(_) | FieldValue::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Ref(r) => write!(f, "{}", r),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&Value> for FieldValue {
    fn from(v: &Value) -> Self {
        FieldValue::from_json(v)
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::from_json(&v)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i.into())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<EntityRef> for FieldValue {
    fn from(r: EntityRef) -> Self {
        FieldValue::Ref(r)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(items: Vec<T>) -> Self {
        FieldValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Primary key of a stored entity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityId {
    Int(i64),
    Uuid(uuid::Uuid),
    Text(String),
}

impl EntityId {
    /// Parse an id given as text: UUIDs and integers are recognized, anything else stays text.
    pub fn parse_str(s: &str) -> Self {
        if let Ok(u) = uuid::Uuid::parse_str(s) {
            return EntityId::Uuid(u);
        }
        if let Ok(n) = s.parse::<i64>() {
            return EntityId::Int(n);
        }
        EntityId::Text(s.to_string())
    }

    pub fn from_json(v: &Value) -> Result<Self, AccessError> {
        match v {
            Value::Number(n) => n
                .as_i64()
                .map(EntityId::Int)
                .ok_or_else(|| AccessError::MalformedRequest(format!("invalid id: {}", n))),
            Value::String(s) => Ok(EntityId::parse_str(s)),
            other => Err(AccessError::MalformedRequest(format!("invalid id: {}", other))),
        }
    }

    /// Id of an identifier declared as `field_type`. Text turns into an integer
    /// only for `Integer` identifiers and into a UUID only for `Uuid` ones; any
    /// other identifier keeps its id as text.
    pub fn coerce(v: &FieldValue, field_type: FieldType) -> Option<Self> {
        match (field_type, v) {
            (_, FieldValue::Ref(r)) => Self::coerce(&r.id.to_field_value(), field_type),
            (FieldType::Integer, FieldValue::Int(i)) => Some(EntityId::Int(*i)),
            (FieldType::Integer, FieldValue::Text(s)) => s.trim().parse().ok().map(EntityId::Int),
            (FieldType::Uuid, FieldValue::Text(s)) => uuid::Uuid::parse_str(s.trim()).ok().map(EntityId::Uuid),
            (FieldType::Integer | FieldType::Uuid, _) => None,
            (_, FieldValue::Text(s)) => Some(EntityId::Text(s.clone())),
            (_, FieldValue::Int(i)) => Some(EntityId::Text(i.to_string())),
            _ => None,
        }
    }

    pub fn to_field_value(&self) -> FieldValue {
        match self {
            EntityId::Int(i) => FieldValue::Int(*i),
            EntityId::Uuid(u) => FieldValue::Text(u.to_string()),
            EntityId::Text(s) => FieldValue::Text(s.clone()),
        }
    }

    pub fn to_json(&self) -> Value {
        self.to_field_value().to_json()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(i) => write!(f, "{}", i),
            EntityId::Uuid(u) => write!(f, "{}", u),
            EntityId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(i: i64) -> Self {
        EntityId::Int(i)
    }
}

impl From<i32> for EntityId {
    fn from(i: i32) -> Self {
        EntityId::Int(i.into())
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::parse_str(s)
    }
}

impl From<uuid::Uuid> for EntityId {
    fn from(u: uuid::Uuid) -> Self {
        EntityId::Uuid(u)
    }
}

/// Lazy reference to another entity: type and id only, nothing loaded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity: String,
    pub id: EntityId,
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.id)
    }
}
