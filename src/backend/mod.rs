//! Persistence backend contract and the in-memory implementation.

pub mod memory;

pub use memory::*;

use crate::entity::Entity;
use crate::error::AccessError;
use crate::query::Expr;
use crate::schema::EntityMapping;
use crate::value::{EntityId, EntityRef, FieldValue};

/// Loads and stores entities by identifier, matches criteria expressions and
/// exposes the schema it maps each entity type with.
///
/// Entity names may be short or qualified. Writes are staged until `flush`.
pub trait PersistenceBackend {
    fn find_by_id(&self, entity: &str, id: &EntityId) -> Result<Option<Box<dyn Entity>>, AccessError>;

    fn find_all(&self, entity: &str) -> Result<Vec<Box<dyn Entity>>, AccessError>;

    /// Entities of `entity` for which `expr` holds, in storage order.
    fn matching(&self, entity: &str, expr: &Expr) -> Result<Vec<Box<dyn Entity>>, AccessError>;

    /// Fresh, unsaved instance.
    fn instantiate(&self, entity: &str) -> Result<Box<dyn Entity>, AccessError>;

    /// Stage an insert or update. Returns the entity's identifier, generating it
    /// when the type has an active generator and none is set.
    fn persist(&mut self, entity: Box<dyn Entity>) -> Result<Option<EntityId>, AccessError>;

    fn remove(&mut self, entity: &dyn Entity) -> Result<(), AccessError>;

    fn flush(&mut self) -> Result<(), AccessError>;

    fn schema_of(&self, entity: &str) -> Result<EntityMapping, AccessError>;

    fn all_schemas(&self) -> Result<Vec<EntityMapping>, AccessError>;

    /// Unloaded handle to `entity` with identifier `id`.
    fn issue_reference(&self, entity: &str, id: &FieldValue) -> Result<EntityRef, AccessError>;
}
