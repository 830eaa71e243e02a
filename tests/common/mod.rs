//! Shared fixtures: a small school registry, a hand-written entity and a
//! backend that records what it is asked to do.

#![allow(dead_code)]

use metacrud::case::field_key;
use metacrud::{
    AccessError, Entity, EntityId, EntityMapping, EntityRef, EntityRegistry, EntityType, Expr, FieldDef, FieldType,
    FieldValue, GeneratorType, InMemoryBackend, Marker, MethodDef, Orm, PersistenceBackend, RegistryMarkerSource,
    Settings,
};
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("metacrud=debug"))
        .with_test_writer()
        .try_init();
}

/// Hand-written entity with behavior beyond plain getters.
#[derive(Clone, Debug, Default)]
pub struct Visit {
    id: Option<i64>,
    status: i64,
    group_size: i64,
    note: Option<String>,
}

impl Entity for Visit {
    fn entity_name(&self) -> &str {
        "app::Visit"
    }

    fn get_field(&self, field: &str) -> Option<FieldValue> {
        Some(match field_key(field).as_str() {
            "id" => self.id.map(FieldValue::Int).unwrap_or(FieldValue::Null),
            "status" => FieldValue::Int(self.status),
            "groupsize" => FieldValue::Int(self.group_size),
            "note" => self.note.clone().map(FieldValue::Text).unwrap_or(FieldValue::Null),
            _ => return None,
        })
    }

    fn has_setter(&self, field: &str) -> bool {
        matches!(field_key(field).as_str(), "status" | "groupsize" | "note")
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), AccessError> {
        let int = |v: &FieldValue| {
            v.as_i64()
                .ok_or_else(|| AccessError::TypeMismatch(format!("{} expects an integer, got {}", field, v)))
        };
        match field_key(field).as_str() {
            "status" => self.status = int(&value)?,
            "groupsize" => self.group_size = int(&value)?,
            "note" => self.note = value.as_str().map(str::to_string),
            _ => {
                return Err(AccessError::NoSuchSetter {
                    entity: self.entity_name().to_string(),
                    field: field.to_string(),
                })
            }
        }
        Ok(())
    }

    fn hydrate_field(&mut self, field: &str, value: FieldValue) -> Result<(), AccessError> {
        if field_key(field) == "id" {
            self.id = value.as_i64();
            return Ok(());
        }
        self.set_field(field, value)
    }

    fn call_method(&self, method: &str, args: &[FieldValue]) -> Result<FieldValue, AccessError> {
        match (method, args) {
            ("isLarge", []) => Ok(FieldValue::Bool(self.group_size >= 20)),
            ("hasMoreThan", [n]) => Ok(FieldValue::Bool(self.group_size > n.as_i64().unwrap_or(i64::MAX))),
            ("getNote", []) => Ok(self.get_field("note").unwrap_or(FieldValue::Null)),
            _ => Err(AccessError::NoSuchMethod {
                entity: self.entity_name().to_string(),
                method: method.to_string(),
            }),
        }
    }

    fn clone_entity(&self) -> Box<dyn Entity> {
        Box::new(self.clone())
    }
}

pub fn types() -> Vec<EntityType> {
    vec![
        EntityType::new("app::School")
            .field(FieldDef::new("id", FieldType::Text).identifier())
            .field(FieldDef::new("Name", FieldType::Text))
            .constant("KINDS", &["public", "private", "charter"]),
        EntityType::new("app::User")
            .generator(GeneratorType::Identity)
            .field(FieldDef::new("id", FieldType::Integer).identifier())
            .field(FieldDef::new("FirstName", FieldType::Text))
            .field(FieldDef::new("LastName", FieldType::Text).nullable())
            .field(FieldDef::new("Status", FieldType::Integer))
            .field(FieldDef::new("Mobil", FieldType::Text).nullable())
            .field(FieldDef::new("School", FieldType::Text).many_to_one("School"))
            .field(FieldDef::new("Settings", FieldType::Json).nullable())
            .field(FieldDef::new("Created", FieldType::DateTime))
            .field(FieldDef::new("LastChange", FieldType::DateTime).auto_created())
            .auto_created_fields(&["Created"])
            .constant("ROLES", &["guest", "staff", "admin"]),
        EntityType::new("app::Visit")
            .generator(GeneratorType::Identity)
            .field(FieldDef::new("id", FieldType::Integer).identifier())
            .field(FieldDef::new("Status", FieldType::Integer))
            .field(FieldDef::new("GroupSize", FieldType::Integer))
            .field(FieldDef::new("Note", FieldType::Text).nullable())
            .method(MethodDef::new("isLarge"))
            .method(MethodDef::new("hasMoreThan").marker(Marker::PostArgs {
                args: vec!["size".into()],
            }))
            .factory(|| Box::new(Visit::default())),
    ]
}

pub fn registry() -> Arc<EntityRegistry> {
    Arc::new(EntityRegistry::build(types()).expect("fixture registry is valid"))
}

pub fn orm() -> Orm<InMemoryBackend> {
    init_tracing();
    Orm::in_memory(registry(), &Settings::default()).expect("in-memory orm")
}

pub fn recording_orm() -> Orm<RecordingBackend> {
    init_tracing();
    let registry = registry();
    let source = Arc::new(RegistryMarkerSource::new(registry.clone()));
    Orm::with_settings(RecordingBackend::new(registry), source, &Settings::default()).expect("recording orm")
}

/// Users (FirstName, Status) stored and flushed in this order.
pub fn seed_users(orm: &mut Orm<impl PersistenceBackend>, users: &[(&str, i64)]) {
    for (name, status) in users {
        orm.create_new_entity(
            "User",
            vec![
                ("FirstName".to_string(), FieldValue::from(*name)),
                ("Status".to_string(), FieldValue::Int(*status)),
            ],
        )
        .expect("seed user");
    }
    orm.flush().expect("flush seed");
}

pub fn seed_visits(orm: &mut Orm<impl PersistenceBackend>, visits: &[(i64, i64)]) {
    for (status, size) in visits {
        orm.create_new_entity(
            "Visit",
            vec![
                ("Status".to_string(), FieldValue::Int(*status)),
                ("GroupSize".to_string(), FieldValue::Int(*size)),
            ],
        )
        .expect("seed visit");
    }
    orm.flush().expect("flush seed");
}

pub fn names(rows: &[Box<dyn Entity>]) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.get_field("FirstName"))
        .map(|v| v.to_string())
        .collect()
}

/// In-memory backend that counts writes and keeps every entity handed to `persist`.
#[derive(Debug)]
pub struct RecordingBackend {
    pub inner: InMemoryBackend,
    pub persisted: Vec<Box<dyn Entity>>,
    pub removes: usize,
    pub flushes: usize,
}

impl RecordingBackend {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        RecordingBackend {
            inner: InMemoryBackend::new(registry),
            persisted: Vec::new(),
            removes: 0,
            flushes: 0,
        }
    }
}

impl PersistenceBackend for RecordingBackend {
    fn find_by_id(&self, entity: &str, id: &EntityId) -> Result<Option<Box<dyn Entity>>, AccessError> {
        self.inner.find_by_id(entity, id)
    }

    fn find_all(&self, entity: &str) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        self.inner.find_all(entity)
    }

    fn matching(&self, entity: &str, expr: &Expr) -> Result<Vec<Box<dyn Entity>>, AccessError> {
        self.inner.matching(entity, expr)
    }

    fn instantiate(&self, entity: &str) -> Result<Box<dyn Entity>, AccessError> {
        self.inner.instantiate(entity)
    }

    fn persist(&mut self, entity: Box<dyn Entity>) -> Result<Option<EntityId>, AccessError> {
        self.persisted.push(entity.clone());
        self.inner.persist(entity)
    }

    fn remove(&mut self, entity: &dyn Entity) -> Result<(), AccessError> {
        self.removes += 1;
        self.inner.remove(entity)
    }

    fn flush(&mut self) -> Result<(), AccessError> {
        self.flushes += 1;
        self.inner.flush()
    }

    fn schema_of(&self, entity: &str) -> Result<EntityMapping, AccessError> {
        self.inner.schema_of(entity)
    }

    fn all_schemas(&self) -> Result<Vec<EntityMapping>, AccessError> {
        self.inner.all_schemas()
    }

    fn issue_reference(&self, entity: &str, id: &FieldValue) -> Result<EntityRef, AccessError> {
        self.inner.issue_reference(entity, id)
    }
}
