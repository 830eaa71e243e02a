//! The uniform name-indexed interface every entity exposes, plus a map-backed
//! implementation for types declared only through the registry.

use crate::case::same_name;
use crate::error::AccessError;
use crate::value::FieldValue;
use std::collections::BTreeMap;
use std::fmt;

/// Name-indexed access to an entity's fields and behavior.
///
/// Field names passed in are the registry's declared names; implementations
/// may accept other spellings but are not required to.
pub trait Entity: fmt::Debug + Send + Sync {
    /// Qualified type name, as registered.
    fn entity_name(&self) -> &str;

    /// Current value of a declared field; `None` if the entity has no such field.
    fn get_field(&self, field: &str) -> Option<FieldValue>;

    /// Whether callers may write `field` through `set_field`.
    fn has_setter(&self, field: &str) -> bool;

    /// Fails with `NoSuchSetter` when `field` is not writable.
    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), AccessError>;

    /// Write performed by the backend (generated ids, auto-created values).
    /// Not subject to setter restrictions.
    fn hydrate_field(&mut self, field: &str, value: FieldValue) -> Result<(), AccessError> {
        self.set_field(field, value)
    }

    /// Invoke a named method. Without an override, zero-argument calls read the
    /// field of that name, also as `getX` / `isX`.
    fn call_method(&self, method: &str, args: &[FieldValue]) -> Result<FieldValue, AccessError> {
        if args.is_empty() {
            if let Some(v) = self.get_field(method) {
                return Ok(v);
            }
            for prefix in ["get", "is"] {
                if let Some(rest) = method.strip_prefix(prefix) {
                    if let Some(v) = self.get_field(rest) {
                        return Ok(v);
                    }
                }
            }
        }
        Err(AccessError::NoSuchMethod {
            entity: self.entity_name().to_string(),
            method: method.to_string(),
        })
    }

    fn clone_entity(&self) -> Box<dyn Entity>;
}

impl Clone for Box<dyn Entity> {
    fn clone(&self) -> Self {
        self.clone_entity()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicColumn {
    pub name: String,
    pub settable: bool,
}

/// Entity whose fields live in a map, shaped by the registry declaration.
#[derive(Clone, Debug)]
pub struct DynamicEntity {
    entity: String,
    columns: Vec<DynamicColumn>,
    values: BTreeMap<String, FieldValue>,
}

impl DynamicEntity {
    pub fn new(entity: impl Into<String>, columns: Vec<DynamicColumn>) -> Self {
        DynamicEntity {
            entity: entity.into(),
            columns,
            values: BTreeMap::new(),
        }
    }

    fn column(&self, field: &str) -> Option<&DynamicColumn> {
        self.columns.iter().find(|c| same_name(&c.name, field))
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }
}

impl Entity for DynamicEntity {
    fn entity_name(&self) -> &str {
        &self.entity
    }

    fn get_field(&self, field: &str) -> Option<FieldValue> {
        let column = self.column(field)?;
        Some(self.values.get(&column.name).cloned().unwrap_or(FieldValue::Null))
    }

    fn has_setter(&self, field: &str) -> bool {
        self.column(field).map(|c| c.settable).unwrap_or(false)
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), AccessError> {
        let name = match self.column(field) {
            Some(c) if c.settable => c.name.clone(),
            _ => {
                return Err(AccessError::NoSuchSetter {
                    entity: self.entity.clone(),
                    field: field.to_string(),
                })
            }
        };
        self.values.insert(name, value);
        Ok(())
    }

    fn hydrate_field(&mut self, field: &str, value: FieldValue) -> Result<(), AccessError> {
        let name = self
            .column(field)
            .map(|c| c.name.clone())
            .ok_or_else(|| AccessError::UnknownField {
                entity: self.entity.clone(),
                field: field.to_string(),
            })?;
        self.values.insert(name, value);
        Ok(())
    }

    fn clone_entity(&self) -> Box<dyn Entity> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit() -> DynamicEntity {
        DynamicEntity::new(
            "app::Visit",
            vec![
                DynamicColumn {
                    name: "id".into(),
                    settable: true,
                },
                DynamicColumn {
                    name: "status".into(),
                    settable: true,
                },
                DynamicColumn {
                    name: "created_at".into(),
                    settable: false,
                },
            ],
        )
    }

    #[test]
    fn unset_declared_fields_read_as_null() {
        let v = visit();
        assert_eq!(v.get_field("status"), Some(FieldValue::Null));
        assert_eq!(v.get_field("nope"), None);
    }

    #[test]
    fn setters_respect_declaration() {
        let mut v = visit();
        v.set_field("Status", FieldValue::Int(2)).unwrap();
        assert_eq!(v.get_field("status"), Some(FieldValue::Int(2)));
        assert!(!v.has_setter("created_at"));
        let err = v.set_field("created_at", FieldValue::from("now")).unwrap_err();
        assert!(matches!(err, AccessError::NoSuchSetter { .. }));
        v.hydrate_field("created_at", FieldValue::from("now")).unwrap();
        assert_eq!(v.get_field("createdAt"), Some(FieldValue::from("now")));
    }

    #[test]
    fn zero_argument_methods_fall_back_to_getters() {
        let mut v = visit();
        v.set_field("status", FieldValue::Int(1)).unwrap();
        assert_eq!(v.call_method("getStatus", &[]).unwrap(), FieldValue::Int(1));
        assert!(matches!(
            v.call_method("status", &[FieldValue::Int(1)]),
            Err(AccessError::NoSuchMethod { .. })
        ));
    }
}
