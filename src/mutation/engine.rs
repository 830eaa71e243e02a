//! Request-scoped mutation engine: property updates with relationship
//! resolution, guarded entity creation and the result payload.

use crate::backend::PersistenceBackend;
use crate::case::same_name;
use crate::error::AccessError;
use crate::mutation::{MutationResult, UpdateRequest};
use crate::orm::Orm;
use crate::schema::Marker;
use crate::value::{EntityId, FieldValue};
use serde_json::{Map, Value};

pub struct MutationEngine<'o, B: PersistenceBackend> {
    orm: &'o mut Orm<B>,
    request: Map<String, Value>,
    result: MutationResult,
    handler: Option<String>,
}

impl<'o, B: PersistenceBackend> MutationEngine<'o, B> {
    /// The payload starts as the request's `return` object, if any.
    pub fn new(orm: &'o mut Orm<B>, request: Map<String, Value>) -> Self {
        let seed = request
            .get("return")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        MutationEngine {
            orm,
            request,
            result: MutationResult::new(seed),
            handler: None,
        }
    }

    /// Entity type whose method markers declare the argument names `method_args` reports.
    pub fn with_handler(mut self, class: impl Into<String>) -> Self {
        self.handler = Some(class.into());
        self
    }

    pub fn orm(&self) -> &Orm<B> {
        &*self.orm
    }

    pub fn request(&self) -> &Map<String, Value> {
        &self.request
    }

    /// Argument names declared for `method` on the handler type; empty without one.
    pub fn method_args(&self, method: &str) -> Result<Vec<String>, AccessError> {
        let Some(handler) = &self.handler else {
            return Ok(Vec::new());
        };
        let class = self.orm.qualify_entity_name(handler);
        Ok(
            match self
                .orm
                .metadata()
                .markers()
                .get_for_method(&class, method, Marker::POST_ARGS)?
            {
                Some(Marker::PostArgs { args }) => args,
                _ => Vec::new(),
            },
        )
    }

    /// Swap a scalar written to a many-to-one field for a backend reference.
    /// Nulls, objects and references pass through.
    pub fn replace_id_with_object(&self, entity: &str, field: &str, value: FieldValue) -> Result<FieldValue, AccessError> {
        if value.is_object() || value.is_null() {
            return Ok(value);
        }
        match self.orm.metadata().relationship_target(entity, field)? {
            Some(target) => {
                let reference = self.orm.backend().issue_reference(&target, &value)?;
                tracing::debug!(entity = %entity, field = %field, reference = %reference, "resolved reference");
                Ok(FieldValue::Ref(reference))
            }
            None => Ok(value),
        }
    }

    pub fn update_property(
        &mut self,
        entity: &str,
        id: &EntityId,
        field: &str,
        value: FieldValue,
    ) -> Result<&mut Self, AccessError> {
        let value = self.replace_id_with_object(entity, field, value)?;
        self.orm.update_property(entity, id, field, value)?;
        Ok(self)
    }

    /// Apply updates in order; not atomic, and flushing is left to the caller.
    pub fn batch_update(&mut self, updates: &[UpdateRequest]) -> Result<&mut Self, AccessError> {
        for u in updates {
            self.update_property(&u.entity, &u.id, &u.field, u.value.clone())?;
        }
        Ok(self)
    }

    /// Each element positional or keyed by the update argument names.
    pub fn batch_update_properties(&mut self, updates: &[Value]) -> Result<&mut Self, AccessError> {
        let parsed = updates
            .iter()
            .map(UpdateRequest::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        self.batch_update(&parsed)
    }

    /// Create `entity` from `properties` unless a required field is missing or
    /// null. A refused creation leaves the backend untouched, records the
    /// properties under `old_properties` and adds an error; otherwise the new
    /// identifier is recorded under `new_id`.
    pub fn create_new_entity(
        &mut self,
        entity: &str,
        properties: &Map<String, Value>,
        flush: bool,
    ) -> Result<&mut Self, AccessError> {
        let qualified = self.orm.qualify_entity_name(entity);
        let missing: Vec<String> = self
            .orm
            .required_fields(&qualified)?
            .into_iter()
            .filter(|required| {
                !properties
                    .iter()
                    .any(|(k, v)| !v.is_null() && same_name(k, required))
            })
            .collect();
        if !missing.is_empty() {
            tracing::warn!(entity = %qualified, missing = ?missing, "refusing to create entity");
            self.result
                .set("old_properties", Value::Object(properties.clone()));
            self.result.add_error(format!(
                "missing required fields for {}: {}",
                entity,
                missing.join(", ")
            ));
            return Ok(self);
        }

        let mut resolved = Vec::with_capacity(properties.len());
        for (name, raw) in properties {
            let value = self.replace_id_with_object(&qualified, name, FieldValue::from_json(raw))?;
            resolved.push((name.clone(), value));
        }
        let id = self.orm.create_new_entity(&qualified, resolved)?;
        if flush {
            self.orm.flush()?;
        }
        self.result
            .set("new_id", id.map(|i| i.to_json()).unwrap_or(Value::Null));
        Ok(self)
    }

    /// [`MutationEngine::create_new_entity`] with the configured default flush flag.
    pub fn create_new_entity_default(&mut self, entity: &str, properties: &Map<String, Value>) -> Result<&mut Self, AccessError> {
        let flush = self.orm.default_flush();
        self.create_new_entity(entity, properties, flush)
    }

    pub fn flush(&mut self) -> Result<&mut Self, AccessError> {
        self.orm.flush()?;
        Ok(self)
    }

    /// One payload entry, or the finalized payload when `key` is `None`:
    /// `onReturn` echoed from the request, `success` and `errors`.
    pub fn get_return(&mut self, key: Option<&str>) -> Value {
        match key {
            Some(k) => self.result.get(k).cloned().unwrap_or(Value::Null),
            None => {
                let on_return = self.request.get("onReturn").cloned().unwrap_or(Value::Null);
                Value::Object(self.result.finalize(on_return).clone())
            }
        }
    }

    pub fn set_return(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.result.set(key, value);
        self
    }

    pub fn set_return_many(&mut self, values: Map<String, Value>) -> &mut Self {
        self.result.extend(values);
        self
    }

    /// Copy request entries into the payload; absent keys become null.
    pub fn set_return_from_request(&mut self, keys: &[&str]) -> &mut Self {
        for key in keys {
            let value = self.request.get(*key).cloned().unwrap_or(Value::Null);
            self.result.set(*key, value);
        }
        self
    }

    pub fn errors(&self) -> &[String] {
        self.result.errors()
    }

    pub fn add_error(&mut self, error: impl Into<String>) -> &mut Self {
        self.result.add_error(error);
        self
    }

    pub fn has_errors(&self) -> bool {
        self.result.has_errors()
    }

    pub fn result(&self) -> &MutationResult {
        &self.result
    }

    pub fn into_result(self) -> MutationResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::schema::{resolve, EntityType, FieldDef, FieldType, GeneratorType, MethodDef};
    use crate::settings::Settings;
    use serde_json::json;
    use std::sync::Arc;

    fn orm() -> Orm<InMemoryBackend> {
        let registry = resolve(vec![
            EntityType::new("app::School")
                .field(FieldDef::new("id", FieldType::Text).identifier())
                .field(FieldDef::new("Name", FieldType::Text)),
            EntityType::new("app::Pupil")
                .generator(GeneratorType::Identity)
                .field(FieldDef::new("id", FieldType::Integer).identifier())
                .field(FieldDef::new("FirstName", FieldType::Text))
                .field(FieldDef::new("School", FieldType::Text).many_to_one("School").nullable()),
            EntityType::new("app::Handler").field(FieldDef::new("id", FieldType::Integer).identifier()).method(
                MethodDef::new("confirmVisit").marker(Marker::PostArgs {
                    args: vec!["visit_id".into(), "confirmed".into()],
                }),
            ),
        ])
        .unwrap();
        Orm::in_memory(Arc::new(registry), &Settings::default()).unwrap()
    }

    fn request(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn seeds_payload_and_echoes_on_return() {
        let mut orm = orm();
        let mut engine = MutationEngine::new(&mut orm, request(json!({"return": {"a": 1}, "onReturn": "reload", "tab": 3})));
        engine.set_return("b", 2).set_return_from_request(&["tab", "absent"]);
        assert_eq!(engine.get_return(Some("a")), json!(1));
        let out = engine.get_return(None);
        assert_eq!(
            out,
            json!({"a": 1, "b": 2, "tab": 3, "absent": null, "onReturn": "reload", "success": true, "errors": []})
        );
    }

    #[test]
    fn creation_with_reference() {
        let mut orm = orm();
        let props = request(json!({"id": "s1", "Name": "North"}));
        MutationEngine::new(&mut orm, Map::new())
            .create_new_entity("School", &props, true)
            .unwrap();

        let mut engine = MutationEngine::new(&mut orm, Map::new());
        engine
            .create_new_entity("Pupil", &request(json!({"FirstName": "Ada", "School": "s1"})), true)
            .unwrap();
        assert!(!engine.has_errors());
        assert_eq!(engine.get_return(Some("new_id")), json!(1));

        let pupil = orm.find("Pupil", &EntityId::Int(1)).unwrap().unwrap();
        let school = pupil.get_field("School").unwrap();
        assert_eq!(school.as_entity_ref().map(|r| r.entity.as_str()), Some("app::School"));
    }

    #[test]
    fn refused_creation_records_old_properties() {
        let mut orm = orm();
        let props = request(json!({"FirstName": null, "School": "s1"}));
        let mut engine = MutationEngine::new(&mut orm, Map::new());
        engine.create_new_entity("Pupil", &props, true).unwrap();
        assert!(engine.has_errors());
        assert_eq!(engine.get_return(Some("old_properties")), Value::Object(props));
        assert_eq!(engine.get_return(Some("new_id")), Value::Null);
        assert_eq!(orm.backend().pending_len(), 0);
        assert_eq!(orm.backend().count("Pupil").unwrap(), 0);
    }

    #[test]
    fn method_args_come_from_handler_markers() {
        let mut orm = orm();
        let engine = MutationEngine::new(&mut orm, Map::new());
        assert!(engine.method_args("confirmVisit").unwrap().is_empty());
        let engine = engine.with_handler("Handler");
        assert_eq!(engine.method_args("confirmVisit").unwrap(), vec!["visit_id", "confirmed"]);
        assert!(engine.method_args("other").unwrap().is_empty());
    }
}
