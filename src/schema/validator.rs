//! Registry validation: naming, identifiers and referential integrity between entity types.

use crate::case::field_key;
use crate::error::ConfigError;
use crate::schema::EntityType;
use regex::Regex;
use std::collections::HashSet;

const IDENT_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

pub fn validate(types: &[EntityType]) -> Result<(), ConfigError> {
    let ident = Regex::new(IDENT_PATTERN).map_err(|e| ConfigError::Validation(e.to_string()))?;

    let mut names = HashSet::new();
    for t in types {
        for segment in t.qualified_name.split("::") {
            if !ident.is_match(segment) {
                return Err(ConfigError::InvalidIdentifier(t.qualified_name.clone()));
            }
        }
        if !names.insert(t.qualified_name.as_str()) {
            return Err(ConfigError::DuplicateEntity(t.qualified_name.clone()));
        }
        if t.short_name != t.qualified_name && !names.insert(t.short_name.as_str()) {
            return Err(ConfigError::DuplicateEntity(t.short_name.clone()));
        }
    }

    for t in types {
        let mut field_keys = HashSet::new();
        for f in &t.fields {
            if !ident.is_match(&f.name) {
                return Err(ConfigError::InvalidIdentifier(format!("{}.{}", t.qualified_name, f.name)));
            }
            if !field_keys.insert(field_key(&f.name)) {
                return Err(ConfigError::Validation(format!(
                    "{} declares field '{}' more than once",
                    t.qualified_name, f.name
                )));
            }
            if let Some(target) = &f.many_to_one {
                if !names.contains(target.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "entity",
                        id: target.clone(),
                    });
                }
            }
        }
        for m in &t.methods {
            if !ident.is_match(&m.name) {
                return Err(ConfigError::InvalidIdentifier(format!("{}::{}", t.qualified_name, m.name)));
            }
        }

        let identifiers = t.fields.iter().filter(|f| f.identifier).count();
        if identifiers != 1 {
            return Err(ConfigError::Validation(format!(
                "{} must declare exactly one identifier field, found {}",
                t.qualified_name, identifiers
            )));
        }

        for name in &t.auto_created {
            if t.field_def(name).is_none() {
                return Err(ConfigError::MissingReference {
                    kind: "field",
                    id: format!("{}.{}", t.qualified_name, name),
                });
            }
        }
    }

    Ok(())
}
