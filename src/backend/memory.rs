//! In-memory backend over the entity registry.
//!
//! Writes are staged and applied in order on `flush`. Reads by id see staged
//! writes; `find_all` and `matching` see committed rows only.

use crate::backend::PersistenceBackend;
use crate::entity::Entity;
use crate::error::AccessError;
use crate::query::Expr;
use crate::schema::{EntityMapping, EntityRegistry, EntityType, FieldType, GeneratorType};
use crate::value::{EntityId, EntityRef, FieldValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug)]
enum Pending {
    Upsert {
        entity: String,
        id: EntityId,
        row: Box<dyn Entity>,
    },
    Delete {
        entity: String,
        id: EntityId,
    },
}

#[derive(Debug)]
pub struct InMemoryBackend {
    registry: Arc<EntityRegistry>,
    tables: HashMap<String, BTreeMap<EntityId, Box<dyn Entity>>>,
    pending: Vec<Pending>,
    sequences: HashMap<String, i64>,
}

impl InMemoryBackend {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        InMemoryBackend {
            registry,
            tables: HashMap::new(),
            pending: Vec::new(),
            sequences: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    fn entity_type(&self, name: &str) -> Result<Arc<EntityType>, AccessError> {
        self.registry
            .get(name)
            .cloned()
            .ok_or_else(|| AccessError::ClassNotFound(name.to_string()))
    }

    fn id_of(t: &EntityType, entity: &dyn Entity) -> Option<EntityId> {
        let ident = t.identifier()?;
        entity
            .get_field(&ident.name)
            .and_then(|v| EntityId::coerce(&v, ident.field_type))
    }

    /// `id` as stored for `t`; `None` when it cannot name a row of that type.
    fn key_of(t: &EntityType, id: &EntityId) -> Option<EntityId> {
        match t.identifier() {
            Some(ident) => EntityId::coerce(&id.to_field_value(), ident.field_type),
            None => Some(id.clone()),
        }
    }

    /// Committed rows of `entity`.
    pub fn count(&self, entity: &str) -> Result<usize, AccessError> {
        let t = self.entity_type(entity)?;
        Ok(self.tables.get(&t.qualified_name).map(BTreeMap::len).unwrap_or(0))
    }

    /// Number of staged writes not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn next_sequence(&mut self, entity: &str) -> i64 {
        let committed = self
            .tables
            .get(entity)
            .into_iter()
            .flat_map(|rows| rows.keys())
            .chain(self.pending.iter().filter_map(|p| match p {
                Pending::Upsert { entity: e, id, .. } if e == entity => Some(id),
                _ => None,
            }))
            .filter_map(|id| match id {
                EntityId::Int(i) => Some(*i),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let counter = self.sequences.entry(entity.to_string()).or_insert(0);
        *counter = (*counter).max(committed) + 1;
        *counter
    }

    fn stamp_auto_created(t: &EntityType, row: &mut Box<dyn Entity>, now: &str) -> Result<(), AccessError> {
        for f in &t.fields {
            if f.field_type != FieldType::DateTime || !t.is_auto_created(&f.name) {
                continue;
            }
            if row.get_field(&f.name).map(|v| v.is_null()).unwrap_or(false) {
                row.hydrate_field(&f.name, FieldValue::from(now))?;
            }
        }
        Ok(())
    }
}

impl PersistenceBackend for InMemoryBackend {
    fn find_by_id(&self, entity: &str, id: &EntityId) -> Result<Option<Box<dyn Entity>>, AccessError> {
        let t = self.entity_type(entity)?;
        let Some(key) = Self::key_of(&t, id) else {
            return Ok(None);
        };
        let id = &key;
        for p in self.pending.iter().rev() {
            match p {
                Pending::Upsert { entity: e, id: pid, row } if *e == t.qualified_name && pid == id => {
                    return Ok(Some(row.clone()));
                }
                Pending::Delete { entity: e, id: pid } if *e == t.qualified_name && pid == id => {
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(self
            .tables
            .get(&t.qualified_name)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    fn find_all(&self, entity: &str) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        let t = self.entity_type(entity)?;
        Ok(self
            .tables
            .get(&t.qualified_name)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    fn matching(&self, entity: &str, expr: &Expr) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        let mut out = Vec::new();
        for row in self.find_all(entity)? {
            if expr.matches(row.as_ref())? {
                out.push(row);
            }
        }
        Ok(out)
    }

    fn instantiate(&self, entity: &str) -> Result<Box<dyn Entity>, AccessError> {
        Ok(self.entity_type(entity)?.instantiate())
    }

    fn persist(&mut self, mut entity: Box<dyn Entity>) -> Result<Option<EntityId>, AccessError> {
        let t = self.entity_type(entity.entity_name())?;
        let ident = t
            .identifier()
            .ok_or_else(|| AccessError::MissingIdentifier(t.qualified_name.clone()))?;
        let id = match Self::id_of(&t, entity.as_ref()) {
            Some(id) => id,
            None => {
                let id = match t.generator {
                    GeneratorType::Identity | GeneratorType::Sequence => {
                        EntityId::Int(self.next_sequence(&t.qualified_name))
                    }
                    GeneratorType::Uuid => EntityId::Uuid(uuid::Uuid::new_v4()),
                    GeneratorType::None => return Err(AccessError::MissingIdentifier(t.qualified_name.clone())),
                };
                entity.hydrate_field(&ident.name, id.to_field_value())?;
                id
            }
        };
        tracing::debug!(entity = %t.qualified_name, id = %id, "staged upsert");
        self.pending.push(Pending::Upsert {
            entity: t.qualified_name.clone(),
            id: id.clone(),
            row: entity,
        });
        Ok(Some(id))
    }

    fn remove(&mut self, entity: &dyn Entity) -> Result<(), AccessError> {
        let t = self.entity_type(entity.entity_name())?;
        let id = Self::id_of(&t, entity).ok_or_else(|| AccessError::MissingIdentifier(t.qualified_name.clone()))?;
        tracing::debug!(entity = %t.qualified_name, id = %id, "staged delete");
        self.pending.push(Pending::Delete {
            entity: t.qualified_name.clone(),
            id,
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<(), AccessError> {
        let pending = std::mem::take(&mut self.pending);
        let now = chrono::Utc::now().to_rfc3339();
        let (mut upserts, mut deletes) = (0usize, 0usize);
        for p in pending {
            match p {
                Pending::Upsert { entity, id, mut row } => {
                    let t = self.entity_type(&entity)?;
                    Self::stamp_auto_created(&t, &mut row, &now)?;
                    self.tables.entry(entity).or_default().insert(id, row);
                    upserts += 1;
                }
                Pending::Delete { entity, id } => {
                    if let Some(rows) = self.tables.get_mut(&entity) {
                        rows.remove(&id);
                    }
                    deletes += 1;
                }
            }
        }
        tracing::info!(upserts, deletes, "flushed");
        Ok(())
    }

    fn schema_of(&self, entity: &str) -> Result<EntityMapping, AccessError> {
        self.registry
            .mapping(entity)
            .ok_or_else(|| AccessError::ClassNotFound(entity.to_string()))
    }

    fn all_schemas(&self) -> Result<Vec<EntityMapping>, AccessError> {
        Ok(self.registry.mappings())
    }

    fn issue_reference(&self, entity: &str, id: &FieldValue) -> Result<EntityRef, AccessError> {
        let t = self.entity_type(entity)?;
        let id = t
            .identifier()
            .and_then(|ident| EntityId::coerce(id, ident.field_type))
            .ok_or_else(|| AccessError::TypeMismatch(format!("cannot reference {} by {}", t.qualified_name, id)))?;
        Ok(EntityRef {
            entity: t.qualified_name.clone(),
            id,
        })
    }
}
