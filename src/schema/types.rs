//! Declarative entity definitions: one field/method/marker table per entity type,
//! registered once at startup.

use crate::case::same_name;
use crate::entity::{DynamicColumn, DynamicEntity, Entity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Which members of a class a marker lookup covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    Class,
    Property,
    Method,
}

/// Identifier value generation strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorType {
    /// Caller supplies the id.
    #[default]
    None,
    Identity,
    Sequence,
    Uuid,
}

impl GeneratorType {
    pub fn is_active(&self) -> bool {
        !matches!(self, GeneratorType::None)
    }
}

/// Storage type of a field as the backend maps it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    DateTime,
    Uuid,
    Json,
    /// Holds a reference to another entity.
    Reference,
}

/// A declarative marker attached to a class, property or method.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "marker")]
pub enum Marker {
    Entity { qualified_name: String },
    Id,
    GeneratedValue { strategy: GeneratorType },
    Column { column: String, field_type: FieldType, nullable: bool },
    ManyToOne { target: String },
    AutoCreated,
    /// Argument names a method expects when called with name-keyed input.
    PostArgs { args: Vec<String> },
    Custom { name: String, value: serde_json::Value },
}

impl Marker {
    pub const ENTITY: &'static str = "Entity";
    pub const ID: &'static str = "Id";
    pub const GENERATED_VALUE: &'static str = "GeneratedValue";
    pub const COLUMN: &'static str = "Column";
    pub const MANY_TO_ONE: &'static str = "ManyToOne";
    pub const AUTO_CREATED: &'static str = "AutoCreated";
    pub const POST_ARGS: &'static str = "PostArgs";

    /// Marker-type key used to index markers of one element.
    pub fn type_name(&self) -> &str {
        match self {
            Marker::Entity { .. } => Self::ENTITY,
            Marker::Id => Self::ID,
            Marker::GeneratedValue { .. } => Self::GENERATED_VALUE,
            Marker::Column { .. } => Self::COLUMN,
            Marker::ManyToOne { .. } => Self::MANY_TO_ONE,
            Marker::AutoCreated => Self::AUTO_CREATED,
            Marker::PostArgs { .. } => Self::POST_ARGS,
            Marker::Custom { name, .. } => name,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub identifier: bool,
    /// Target entity (short or qualified name) of a many-to-one relationship.
    pub many_to_one: Option<String>,
    pub auto_created: bool,
    /// Whether callers may write the field through `set_field`.
    pub settable: bool,
    pub markers: Vec<Marker>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDef {
            name: name.into(),
            field_type,
            nullable: false,
            identifier: false,
            many_to_one: None,
            auto_created: false,
            settable: true,
            markers: Vec::new(),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn identifier(mut self) -> Self {
        self.identifier = true;
        self
    }

    pub fn many_to_one(mut self, target: impl Into<String>) -> Self {
        self.many_to_one = Some(target.into());
        self.field_type = FieldType::Reference;
        self
    }

    pub fn auto_created(mut self) -> Self {
        self.auto_created = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.settable = false;
        self
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Markers this field carries, derived from its declaration plus any extra ones.
    pub fn declared_markers(&self, generator: GeneratorType) -> Vec<Marker> {
        let mut out = Vec::with_capacity(self.markers.len() + 4);
        if self.identifier {
            out.push(Marker::Id);
            if generator.is_active() {
                out.push(Marker::GeneratedValue { strategy: generator });
            }
        }
        out.push(Marker::Column {
            column: crate::case::to_snake_case(&self.name),
            field_type: self.field_type,
            nullable: self.nullable,
        });
        if let Some(target) = &self.many_to_one {
            out.push(Marker::ManyToOne { target: target.clone() });
        }
        if self.auto_created {
            out.push(Marker::AutoCreated);
        }
        out.extend(self.markers.iter().cloned());
        out
    }
}

#[derive(Clone, Debug)]
pub struct MethodDef {
    pub name: String,
    pub markers: Vec<Marker>,
}

impl MethodDef {
    pub fn new(name: impl Into<String>) -> Self {
        MethodDef {
            name: name.into(),
            markers: Vec::new(),
        }
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }
}

pub type EntityFactory = Arc<dyn Fn() -> Box<dyn Entity> + Send + Sync>;

/// Declarative table for one entity type.
#[derive(Clone)]
pub struct EntityType {
    pub short_name: String,
    pub qualified_name: String,
    pub generator: GeneratorType,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    pub class_markers: Vec<Marker>,
    /// Fields filled in by the backend rather than by callers.
    pub auto_created: Vec<String>,
    /// Named label lists; a label's position is its index.
    pub constants: BTreeMap<String, Vec<String>>,
    factory: Option<EntityFactory>,
}

impl EntityType {
    /// `qualified_name` is `::`-separated; its last segment becomes the short name.
    pub fn new(qualified_name: impl Into<String>) -> Self {
        let qualified_name = qualified_name.into();
        let short_name = qualified_name
            .rsplit("::")
            .next()
            .unwrap_or(qualified_name.as_str())
            .to_string();
        EntityType {
            short_name,
            qualified_name,
            generator: GeneratorType::None,
            fields: Vec::new(),
            methods: Vec::new(),
            class_markers: Vec::new(),
            auto_created: Vec::new(),
            constants: BTreeMap::new(),
            factory: None,
        }
    }

    pub fn generator(mut self, generator: GeneratorType) -> Self {
        self.generator = generator;
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.class_markers.push(marker);
        self
    }

    pub fn auto_created_fields(mut self, fields: &[&str]) -> Self {
        self.auto_created.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn constant(mut self, name: impl Into<String>, labels: &[&str]) -> Self {
        self.constants
            .insert(name.into(), labels.iter().map(|l| l.to_string()).collect());
        self
    }

    /// Constructor for hand-written entity structs. Without one, instances are `DynamicEntity`.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Entity> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn instantiate(&self) -> Box<dyn Entity> {
        match &self.factory {
            Some(f) => f(),
            None => Box::new(DynamicEntity::new(
                self.qualified_name.clone(),
                self.fields
                    .iter()
                    .map(|f| DynamicColumn {
                        name: f.name.clone(),
                        settable: f.settable,
                    })
                    .collect(),
            )),
        }
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| same_name(&f.name, name))
    }

    pub fn identifier(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.identifier)
    }

    /// Allow-listed or marked auto-created.
    pub fn is_auto_created(&self, field: &str) -> bool {
        self.auto_created.iter().any(|f| same_name(f, field))
            || self.field_def(field).map(|f| f.auto_created).unwrap_or(false)
    }

    /// Whether `name` is this type's short or qualified name.
    pub fn is_named(&self, name: &str) -> bool {
        self.short_name == name || self.qualified_name == name
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("qualified_name", &self.qualified_name)
            .field("generator", &self.generator)
            .field("fields", &self.fields)
            .field("methods", &self.methods)
            .field("class_markers", &self.class_markers)
            .field("auto_created", &self.auto_created)
            .field("constants", &self.constants)
            .field("factory", &self.factory.is_some())
            .finish()
    }
}
