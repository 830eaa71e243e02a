//! Example consumer: a separate Rust project that uses metacrud as a dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`

use metacrud::{
    Entity, EntityId, EntityRegistry, EntityType, FieldDef, FieldType, GeneratorType, MutationEngine, Orm, Settings,
};
use serde_json::json;
use std::sync::Arc;

fn registry() -> Result<EntityRegistry, metacrud::ConfigError> {
    EntityRegistry::build(vec![
        EntityType::new("school::School")
            .field(FieldDef::new("id", FieldType::Text).identifier())
            .field(FieldDef::new("Name", FieldType::Text)),
        EntityType::new("school::Visit")
            .generator(GeneratorType::Identity)
            .field(FieldDef::new("id", FieldType::Integer).identifier())
            .field(FieldDef::new("Status", FieldType::Integer))
            .field(FieldDef::new("Note", FieldType::Text).nullable())
            .field(FieldDef::new("School", FieldType::Text).many_to_one("School"))
            .field(FieldDef::new("Created", FieldType::DateTime).nullable())
            .auto_created_fields(&["Created"])
            .constant("STATUSES", &["planned", "confirmed", "done"]),
    ])
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("metacrud=info")),
        )
        .init();

    let settings = Settings::load()?;
    let mut orm = Orm::in_memory(Arc::new(registry()?), &settings)?;
    tracing::info!(required = ?orm.required_fields("Visit")?, "visit metadata");

    let mut engine = MutationEngine::new(&mut orm, json!({"onReturn": "reload"}).as_object().cloned().unwrap_or_default());
    let school = json!({"id": "north", "Name": "North School"});
    let visit = json!({"Status": 1, "School": "north"});
    let incomplete = json!({"Note": "no school yet"});
    engine
        .create_new_entity("School", school.as_object().ok_or("school props")?, true)?
        .create_new_entity("Visit", visit.as_object().ok_or("visit props")?, true)?
        .create_new_entity("Visit", incomplete.as_object().ok_or("incomplete props")?, true)?;
    engine.batch_update_properties(&[json!(["Visit", 1, "Note", "moved to friday"])])?;
    engine.flush()?;
    tracing::info!(result = %engine.get_return(None), "mutations done");

    let repo = orm.repository("Visit")?;
    let confirmed = repo.index_from_constant("statuses", "confirmed", None)?;
    let open = repo.select_and(&[json!(["lt", "Status", confirmed]), json!(["neq", "Note", "cancelled"])])?;
    for v in &open {
        tracing::info!(visit = ?v, "open visit");
    }
    if let Some(v) = orm.find("Visit", &EntityId::Int(1))? {
        tracing::info!(school = ?v.get_field("School"), created = ?v.get_field("Created"), "visit 1");
    }
    Ok(())
}
