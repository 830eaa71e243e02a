//! Resolved registry and the backend-facing schema view of each entity type.

use crate::case::same_name;
use crate::schema::{EntityType, FieldType, GeneratorType};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// How the backend maps one field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldMapping {
    pub name: String,
    pub column_name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub identifier: bool,
    /// Related entity for reference fields.
    pub target_entity: Option<String>,
}

/// Backend schema for one entity type.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityMapping {
    pub short_name: String,
    pub qualified_name: String,
    pub generator: GeneratorType,
    pub fields: Vec<FieldMapping>,
    /// Type-level allow-list of fields the backend fills in.
    pub auto_created: Vec<String>,
    pub constants: BTreeMap<String, Vec<String>>,
}

impl EntityMapping {
    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| same_name(&f.name, name))
    }

    pub fn identifier(&self) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.identifier)
    }
}

/// All registered entity types, addressable by short or qualified name.
#[derive(Clone, Debug, Default)]
pub struct EntityRegistry {
    pub(crate) types: Vec<Arc<EntityType>>,
    pub(crate) by_name: HashMap<String, usize>,
}

impl EntityRegistry {
    pub fn get(&self, name: &str) -> Option<&Arc<EntityType>> {
        self.by_name.get(name).map(|&i| &self.types[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn mapping(&self, name: &str) -> Option<EntityMapping> {
        self.get(name).map(|t| self.build_mapping(t))
    }

    pub fn mappings(&self) -> Vec<EntityMapping> {
        self.types.iter().map(|t| self.build_mapping(t)).collect()
    }

    fn build_mapping(&self, t: &EntityType) -> EntityMapping {
        EntityMapping {
            short_name: t.short_name.clone(),
            qualified_name: t.qualified_name.clone(),
            generator: t.generator,
            fields: t
                .fields
                .iter()
                .map(|f| FieldMapping {
                    name: f.name.clone(),
                    column_name: crate::case::to_snake_case(&f.name),
                    field_type: f.field_type,
                    nullable: f.nullable,
                    identifier: f.identifier,
                    target_entity: f
                        .many_to_one
                        .as_deref()
                        .map(|target| self.get(target).map(|r| r.qualified_name.clone()).unwrap_or_else(|| target.to_string())),
                })
                .collect(),
            auto_created: t.auto_created.clone(),
            constants: t.constants.clone(),
        }
    }
}
