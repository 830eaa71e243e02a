//! Update requests as they arrive from callers: positional or name-keyed.

use crate::error::AccessError;
use crate::value::{EntityId, FieldValue};
use serde_json::Value;

/// Argument names of a property update, in positional order.
pub const UPDATE_PROPERTY_ARGS: [&str; 4] = ["entity_class", "entity_id", "property", "value"];

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateRequest {
    pub entity: String,
    pub id: EntityId,
    pub field: String,
    pub value: FieldValue,
}

impl UpdateRequest {
    pub fn new(
        entity: impl Into<String>,
        id: impl Into<EntityId>,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Self {
        UpdateRequest {
            entity: entity.into(),
            id: id.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// `[entity_class, entity_id, property, value]`, or an object keyed by those
    /// names in any order. A missing value means null.
    pub fn from_json(v: &Value) -> Result<Self, AccessError> {
        let args: Vec<&Value> = match v {
            Value::Array(a) if (3..=4).contains(&a.len()) => a.iter().collect(),
            Value::Object(o) => {
                let mut out = Vec::with_capacity(UPDATE_PROPERTY_ARGS.len());
                for name in UPDATE_PROPERTY_ARGS {
                    match o.get(name) {
                        Some(v) => out.push(v),
                        None if name == "value" => {}
                        None => {
                            return Err(AccessError::MalformedRequest(format!(
                                "update request without \"{}\"",
                                name
                            )))
                        }
                    }
                }
                out
            }
            other => {
                return Err(AccessError::MalformedRequest(format!(
                    "expected {} update arguments, got {}",
                    UPDATE_PROPERTY_ARGS.len(),
                    other
                )))
            }
        };
        let text = |i: usize| {
            args[i].as_str().map(str::to_string).ok_or_else(|| {
                AccessError::MalformedRequest(format!("{} must be a string, got {}", UPDATE_PROPERTY_ARGS[i], args[i]))
            })
        };
        Ok(UpdateRequest {
            entity: text(0)?,
            id: EntityId::from_json(args[1])?,
            field: text(2)?,
            value: args.get(3).map(|v| FieldValue::from_json(v)).unwrap_or(FieldValue::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn positional_and_keyed_agree() {
        let positional = UpdateRequest::from_json(&json!(["Visit", 3, "Status", 2])).unwrap();
        let keyed = UpdateRequest::from_json(&json!({
            "value": 2,
            "property": "Status",
            "entity_id": 3,
            "entity_class": "Visit"
        }))
        .unwrap();
        assert_eq!(positional, keyed);
        assert_eq!(positional, UpdateRequest::new("Visit", 3, "Status", 2));
    }

    #[test]
    fn missing_value_is_null() {
        let r = UpdateRequest::from_json(&json!(["Visit", "3", "Note"])).unwrap();
        assert_eq!(r.value, FieldValue::Null);
        assert_eq!(r.id, EntityId::Int(3));
    }

    #[test]
    fn rejects_malformed() {
        assert!(UpdateRequest::from_json(&json!(["Visit", 3])).is_err());
        assert!(UpdateRequest::from_json(&json!({"entity_class": "Visit"})).is_err());
        assert!(UpdateRequest::from_json(&json!([1, 3, "Status", 2])).is_err());
        assert!(UpdateRequest::from_json(&json!("Visit")).is_err());
    }
}
