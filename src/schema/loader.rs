//! Build the registry from declared entity types.

use crate::error::ConfigError;
use crate::schema::{validate, EntityRegistry, EntityType};
use std::collections::HashMap;
use std::sync::Arc;

/// Build the registry (call once at startup). Validates first.
pub fn resolve(types: Vec<EntityType>) -> Result<EntityRegistry, ConfigError> {
    validate(&types)?;

    let mut by_name = HashMap::with_capacity(types.len() * 2);
    let mut registered = Vec::with_capacity(types.len());
    for (i, t) in types.into_iter().enumerate() {
        by_name.insert(t.qualified_name.clone(), i);
        by_name.insert(t.short_name.clone(), i);
        tracing::debug!(entity = %t.qualified_name, fields = t.fields.len(), "registered entity type");
        registered.push(Arc::new(t));
    }

    Ok(EntityRegistry {
        types: registered,
        by_name,
    })
}

impl EntityRegistry {
    /// Same as [`resolve`].
    pub fn build(types: Vec<EntityType>) -> Result<Self, ConfigError> {
        resolve(types)
    }
}
