//! metacrud: metadata-driven generic queries and mutations over a persistence backend.
//!
//! Entity types are declared once in an [`EntityRegistry`]. The [`MarkerCache`]
//! and [`MetadataService`] derive field facts from it, the query layer turns
//! loose filter input into criteria, and the [`MutationEngine`] writes
//! properties by name, resolving relationship ids into references.

pub mod backend;
pub mod case;
pub mod entity;
pub mod error;
pub mod metadata;
pub mod mutation;
pub mod orm;
pub mod query;
pub mod schema;
pub mod settings;
pub mod value;

pub use backend::{InMemoryBackend, PersistenceBackend};
pub use entity::{DynamicColumn, DynamicEntity, Entity};
pub use error::{AccessError, ConfigError};
pub use metadata::{
    CacheStore, ClassDescriptor, FieldDescriptor, FileCacheStore, MarkerCache, MarkerSource, MemoryCacheStore,
    MetadataService, RegistryMarkerSource,
};
pub use mutation::{MutationEngine, MutationResult, UpdateRequest};
pub use orm::{Orm, SetRequest};
pub use query::{apply_logical_operator, normalize, Combinator, Expr, Filter, FilterTriple, MethodFilter, Operator, Repository};
pub use schema::{
    resolve, ElementKind, EntityMapping, EntityRegistry, EntityType, FieldDef, FieldMapping, FieldType, GeneratorType, Marker,
    MethodDef,
};
pub use settings::{CacheBackend, Settings};
pub use value::{EntityId, EntityRef, FieldValue};
