//! Per-entity field facts derived from the backend schema and the marker cache.

use crate::backend::PersistenceBackend;
use crate::case::same_name;
use crate::error::AccessError;
use crate::metadata::MarkerCache;
use crate::schema::{EntityMapping, FieldMapping, FieldType, GeneratorType, Marker};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub column_name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub identifier: bool,
    /// Identifier whose value the backend generates.
    pub generator: bool,
    pub auto_created: bool,
    /// Qualified target of a many-to-one relationship.
    pub relationship: Option<String>,
}

impl FieldDescriptor {
    /// A field callers must supply on creation: not a generated identifier,
    /// not auto-created, not nullable (checked in that order).
    pub fn is_required(&self) -> bool {
        if self.identifier && self.generator {
            return false;
        }
        if self.auto_created {
            return false;
        }
        !self.nullable
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDescriptor {
    pub short_name: String,
    pub qualified_name: String,
    pub generator: GeneratorType,
    pub fields: Vec<FieldDescriptor>,
    /// Names of required fields, in declaration order.
    pub required: Vec<String>,
}

impl ClassDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| same_name(&f.name, name))
    }
}

/// Read-only after construction apart from the memoized descriptors.
pub struct MetadataService {
    schemas: HashMap<String, Arc<EntityMapping>>,
    short_to_qualified: BTreeMap<String, String>,
    markers: Arc<MarkerCache>,
    descriptors: RwLock<HashMap<String, Arc<ClassDescriptor>>>,
}

impl MetadataService {
    /// Read the backend's schema once.
    pub fn load<B>(backend: &B, markers: Arc<MarkerCache>) -> Result<Self, AccessError>
    where
        B: PersistenceBackend + ?Sized,
    {
        let mut schemas = HashMap::new();
        let mut short_to_qualified = BTreeMap::new();
        for mapping in backend.all_schemas()? {
            short_to_qualified.insert(mapping.short_name.clone(), mapping.qualified_name.clone());
            schemas.insert(mapping.qualified_name.clone(), Arc::new(mapping));
        }
        tracing::debug!(entities = schemas.len(), "loaded backend schema");
        Ok(MetadataService {
            schemas,
            short_to_qualified,
            markers,
            descriptors: RwLock::new(HashMap::new()),
        })
    }

    pub fn markers(&self) -> &Arc<MarkerCache> {
        &self.markers
    }

    /// Qualified name for a short one; unknown names come back unchanged.
    pub fn qualify_name(&self, name: &str) -> String {
        self.short_to_qualified
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    pub fn short_name(&self, qualified: &str) -> Option<String> {
        self.short_to_qualified
            .iter()
            .find(|(_, q)| q.as_str() == qualified)
            .map(|(s, _)| s.clone())
    }

    /// short name -> qualified name for every known entity type.
    pub fn entity_to_class_mapping(&self) -> &BTreeMap<String, String> {
        &self.short_to_qualified
    }

    pub fn mapping(&self, entity: &str) -> Result<&Arc<EntityMapping>, AccessError> {
        self.schemas
            .get(&self.qualify_name(entity))
            .ok_or_else(|| AccessError::ClassNotFound(entity.to_string()))
    }

    pub fn field_mappings(&self, entity: &str) -> Result<&[FieldMapping], AccessError> {
        Ok(&self.mapping(entity)?.fields)
    }

    /// Descriptor for `entity`, computed on first access.
    pub fn describe(&self, entity: &str) -> Result<Arc<ClassDescriptor>, AccessError> {
        let qualified = self.qualify_name(entity);
        if let Some(d) = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&qualified)
        {
            return Ok(d.clone());
        }

        let mapping = self.mapping(&qualified)?;
        let mut fields = Vec::with_capacity(mapping.fields.len());
        for f in &mapping.fields {
            fields.push(FieldDescriptor {
                name: f.name.clone(),
                column_name: f.column_name.clone(),
                field_type: f.field_type,
                nullable: f.nullable,
                identifier: f.identifier,
                generator: f.identifier && mapping.generator.is_active(),
                auto_created: self.auto_created_in(mapping, &f.name)?,
                relationship: self.relationship_in(&qualified, &f.name)?,
            });
        }
        let required = fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name.clone())
            .collect();
        let descriptor = Arc::new(ClassDescriptor {
            short_name: mapping.short_name.clone(),
            qualified_name: qualified.clone(),
            generator: mapping.generator,
            fields,
            required,
        });
        tracing::debug!(entity = %qualified, required = ?descriptor.required, "described entity");

        let mut descriptors = self.descriptors.write().unwrap_or_else(PoisonError::into_inner);
        Ok(descriptors.entry(qualified).or_insert(descriptor).clone())
    }

    /// Declared field for `field`, accepting any casing or snake/camel spelling.
    pub fn resolve_field(&self, entity: &str, field: &str) -> Result<String, AccessError> {
        self.mapping(entity)?
            .field(field)
            .map(|f| f.name.clone())
            .ok_or_else(|| AccessError::UnknownField {
                entity: entity.to_string(),
                field: field.to_string(),
            })
    }

    fn field_mapping<'a>(&'a self, entity: &str, field: &str) -> Result<&'a FieldMapping, AccessError> {
        self.mapping(entity)?
            .field(field)
            .ok_or_else(|| AccessError::UnknownField {
                entity: entity.to_string(),
                field: field.to_string(),
            })
    }

    pub fn is_nullable(&self, entity: &str, field: &str) -> Result<bool, AccessError> {
        Ok(self.field_mapping(entity, field)?.nullable)
    }

    pub fn is_identifier(&self, entity: &str, field: &str) -> Result<bool, AccessError> {
        Ok(self.field_mapping(entity, field)?.identifier)
    }

    /// Whether the backend generates values for the identifier `field`.
    pub fn has_generator(&self, entity: &str, field: &str) -> Result<bool, AccessError> {
        let mapping = self.mapping(entity)?;
        let f = self.field_mapping(entity, field)?;
        Ok(f.identifier && mapping.generator.is_active())
    }

    /// On the type's allow-list or carrying the auto-created marker.
    pub fn is_auto_created(&self, entity: &str, field: &str) -> Result<bool, AccessError> {
        let mapping = self.mapping(entity)?;
        self.auto_created_in(mapping, field)
    }

    fn auto_created_in(&self, mapping: &EntityMapping, field: &str) -> Result<bool, AccessError> {
        if mapping.auto_created.iter().any(|f| same_name(f, field)) {
            return Ok(true);
        }
        self.markers
            .has_property_marker(&mapping.qualified_name, field, Marker::AUTO_CREATED)
    }

    /// Qualified target type when `field` is a many-to-one relationship.
    pub fn relationship_target(&self, entity: &str, field: &str) -> Result<Option<String>, AccessError> {
        let qualified = self.qualify_name(entity);
        self.mapping(&qualified)?;
        self.relationship_in(&qualified, field)
    }

    /// The many-to-one marker wins; otherwise the backend schema's target, if any.
    fn relationship_in(&self, qualified: &str, field: &str) -> Result<Option<String>, AccessError> {
        if let Some(Marker::ManyToOne { target }) = self.markers.get_for_property(qualified, field, Marker::MANY_TO_ONE)? {
            return Ok(Some(self.qualify_name(&target)));
        }
        Ok(self
            .mapping(qualified)?
            .field(field)
            .and_then(|f| f.target_entity.as_deref())
            .map(|target| self.qualify_name(target)))
    }

    /// Fields that must be supplied when creating `entity`. Memoized.
    pub fn required_fields(&self, entity: &str) -> Result<Vec<String>, AccessError> {
        Ok(self.describe(entity)?.required.clone())
    }
}

impl std::fmt::Debug for MetadataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataService")
            .field("entities", &self.short_to_qualified)
            .field("markers", &self.markers)
            .finish()
    }
}
