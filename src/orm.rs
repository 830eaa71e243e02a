//! Facade over a backend and its metadata: lookups, saves and name-indexed
//! property writes without relationship resolution.

use crate::backend::{InMemoryBackend, PersistenceBackend};
use crate::entity::Entity;
use crate::error::AccessError;
use crate::metadata::{MarkerCache, MarkerSource, MetadataService, RegistryMarkerSource};
use crate::mutation::UpdateRequest;
use crate::query::Repository;
use crate::schema::EntityRegistry;
use crate::settings::Settings;
use crate::value::{EntityId, FieldValue};
use serde_json::Value;
use std::sync::Arc;

/// Attribute written by [`Orm::set`] when a request names none.
pub const DEFAULT_SET_ATTRIBUTE: &str = "Value";

/// One `set` request: write `value` into `attribute` of entity `entity#id`.
#[derive(Clone, Debug, PartialEq)]
pub struct SetRequest {
    pub entity: String,
    pub id: EntityId,
    pub value: FieldValue,
    pub attribute: String,
}

impl SetRequest {
    pub fn new(entity: impl Into<String>, id: impl Into<EntityId>, value: impl Into<FieldValue>) -> Self {
        SetRequest {
            entity: entity.into(),
            id: id.into(),
            value: value.into(),
            attribute: DEFAULT_SET_ATTRIBUTE.to_string(),
        }
    }

    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    /// `[repo, id, value, att_name?]` or `{"repo", "id", "value", "att_name"?}`.
    pub fn from_json(v: &Value) -> Result<Self, AccessError> {
        let (repo, id, value, att) = match v {
            Value::Array(a) if (3..=4).contains(&a.len()) => (&a[0], &a[1], &a[2], a.get(3)),
            Value::Object(o) => {
                let get = |k: &str| {
                    o.get(k)
                        .ok_or_else(|| AccessError::MalformedRequest(format!("set request without \"{}\"", k)))
                };
                (get("repo")?, get("id")?, get("value")?, o.get("att_name"))
            }
            other => {
                return Err(AccessError::MalformedRequest(format!(
                    "expected 3 or 4 set arguments, got {}",
                    other
                )))
            }
        };
        let repo = repo
            .as_str()
            .ok_or_else(|| AccessError::MalformedRequest(format!("entity name must be a string, got {}", repo)))?;
        let mut req = SetRequest::new(repo, EntityId::from_json(id)?, FieldValue::from_json(value));
        if let Some(att) = att.and_then(Value::as_str) {
            req = req.attribute(att);
        }
        Ok(req)
    }

    /// One request, or a list of requests.
    pub fn many_from_json(v: &Value) -> Result<Vec<Self>, AccessError> {
        match v {
            Value::Array(items) if !items.is_empty() && items.iter().all(|i| i.is_array() || i.is_object()) => {
                items.iter().map(SetRequest::from_json).collect()
            }
            single => Ok(vec![SetRequest::from_json(single)?]),
        }
    }
}

pub struct Orm<B: PersistenceBackend> {
    backend: B,
    metadata: Arc<MetadataService>,
    default_flush: bool,
}

impl<B: PersistenceBackend> Orm<B> {
    pub fn new(backend: B, metadata: Arc<MetadataService>) -> Self {
        Orm {
            backend,
            metadata,
            default_flush: true,
        }
    }

    /// Build the marker cache (with the configured store) and load metadata from `backend`.
    pub fn with_settings(backend: B, source: Arc<dyn MarkerSource>, settings: &Settings) -> Result<Self, AccessError> {
        let store = settings.cache_store()?;
        let markers = Arc::new(MarkerCache::new(source, store, settings.cache_key.clone()));
        let metadata = Arc::new(MetadataService::load(&backend, markers)?);
        Ok(Orm {
            backend,
            metadata,
            default_flush: settings.default_flush,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn metadata(&self) -> &Arc<MetadataService> {
        &self.metadata
    }

    pub fn default_flush(&self) -> bool {
        self.default_flush
    }

    pub fn qualify_entity_name(&self, name: &str) -> String {
        self.metadata.qualify_name(name)
    }

    pub fn short_entity_name(&self, qualified: &str) -> Option<String> {
        self.metadata.short_name(qualified)
    }

    pub fn required_fields(&self, entity: &str) -> Result<Vec<String>, AccessError> {
        self.metadata.required_fields(entity)
    }

    pub fn repository(&self, entity: &str) -> Result<Repository<'_, B>, AccessError> {
        Repository::new(&self.backend, &self.metadata, entity)
    }

    pub fn find(&self, entity: &str, id: &EntityId) -> Result<Option<Box<dyn Entity>>, AccessError> {
        self.repository(entity)?.find(id)
    }

    pub fn find_by<K, I>(&self, entity: &str, criteria: I) -> Result<Vec<Box<dyn Entity>>, AccessError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, FieldValue)>,
    {
        self.repository(entity)?.find_by(criteria)
    }

    /// Persist and flush.
    pub fn save(&mut self, entity: Box<dyn Entity>) -> Result<Option<EntityId>, AccessError> {
        let id = self.backend.persist(entity)?;
        self.backend.flush()?;
        Ok(id)
    }

    /// Remove and flush.
    pub fn delete(&mut self, entity: &dyn Entity) -> Result<(), AccessError> {
        self.backend.remove(entity)?;
        self.backend.flush()
    }

    pub fn flush(&mut self) -> Result<(), AccessError> {
        self.backend.flush()
    }

    fn settable_field(&self, entity: &str, field: &str) -> Result<String, AccessError> {
        self.metadata.resolve_field(entity, field).map_err(|e| match e {
            AccessError::UnknownField { entity, field } => AccessError::NoSuchSetter { entity, field },
            other => other,
        })
    }

    /// Load `entity#id`, write `value` into `field` and stage the change.
    /// The value is written as given.
    pub fn update_property(&mut self, entity: &str, id: &EntityId, field: &str, value: FieldValue) -> Result<(), AccessError> {
        let mut found = self.find(entity, id)?.ok_or_else(|| AccessError::EntityNotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })?;
        let field = self.settable_field(entity, field)?;
        if !found.has_setter(&field) {
            return Err(AccessError::NoSuchSetter {
                entity: entity.to_string(),
                field,
            });
        }
        found.set_field(&field, value)?;
        tracing::debug!(entity = %entity, id = %id, field = %field, "updated property");
        self.backend.persist(found)?;
        Ok(())
    }

    /// Apply each update in order. Stops at the first failure; earlier updates stay staged.
    pub fn batch_update_properties(&mut self, updates: &[UpdateRequest]) -> Result<(), AccessError> {
        for u in updates {
            self.update_property(&u.entity, &u.id, &u.field, u.value.clone())?;
        }
        Ok(())
    }

    /// Construct `entity` through its setters and stage it. No flush.
    pub fn create_new_entity<I>(&mut self, entity: &str, properties: I) -> Result<Option<EntityId>, AccessError>
    where
        I: IntoIterator<Item = (String, FieldValue)>,
    {
        let qualified = self.metadata.mapping(entity)?.qualified_name.clone();
        let mut created = self.backend.instantiate(&qualified)?;
        for (name, value) in properties {
            let field = self.settable_field(&qualified, &name)?;
            created.set_field(&field, value)?;
        }
        let id = self.backend.persist(created)?;
        tracing::debug!(entity = %qualified, id = ?id, "created entity");
        Ok(id)
    }

    pub fn set(&mut self, requests: &[SetRequest]) -> Result<(), AccessError> {
        for r in requests {
            self.update_property(&r.entity, &r.id, &r.attribute, r.value.clone())?;
        }
        Ok(())
    }

    pub fn set_and_flush(&mut self, requests: &[SetRequest]) -> Result<(), AccessError> {
        self.set(requests)?;
        self.backend.flush()
    }
}

impl Orm<InMemoryBackend> {
    /// In-memory backend over `registry`, markers read from the same registry.
    pub fn in_memory(registry: Arc<EntityRegistry>, settings: &Settings) -> Result<Self, AccessError> {
        let source = Arc::new(RegistryMarkerSource::new(registry.clone()));
        Orm::with_settings(InMemoryBackend::new(registry), source, settings)
    }
}

impl<B: PersistenceBackend + std::fmt::Debug> std::fmt::Debug for Orm<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orm")
            .field("backend", &self.backend)
            .field("metadata", &self.metadata)
            .field("default_flush", &self.default_flush)
            .finish()
    }
}
