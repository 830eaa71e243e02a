//! Mutation result envelope: free-form payload plus an ordered error list.

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MutationResult {
    payload: Map<String, Value>,
    #[serde(skip)]
    errors: Vec<String>,
}

impl MutationResult {
    pub fn new(payload: Map<String, Value>) -> Self {
        MutationResult {
            payload,
            errors: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.payload.insert(key.into(), value.into());
    }

    pub fn extend(&mut self, values: Map<String, Value>) {
        self.payload.extend(values);
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Write `onReturn`, `success` and `errors` into the payload and return it.
    /// Calling it again rewrites the same keys from the current state.
    pub fn finalize(&mut self, on_return: Value) -> &Map<String, Value> {
        let success = !self.has_errors();
        let errors = Value::from(self.errors.clone());
        self.payload.insert("onReturn".into(), on_return);
        self.payload.insert("success".into(), Value::Bool(success));
        self.payload.insert("errors".into(), errors);
        &self.payload
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn into_payload(self) -> Map<String, Value> {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finalize_is_idempotent() {
        let mut r = MutationResult::default();
        r.set("new_id", 7);
        let first = r.finalize(Value::Null).clone();
        let second = r.finalize(Value::Null).clone();
        assert_eq!(first, second);
        assert_eq!(first["success"], json!(true));
        assert_eq!(first["errors"], json!([]));
        assert_eq!(first["new_id"], json!(7));
    }

    #[test]
    fn errors_flip_success() {
        let mut r = MutationResult::new(json!({"seed": 1}).as_object().cloned().unwrap_or_default());
        r.add_error("missing required fields: Name");
        assert!(r.has_errors());
        let out = r.finalize(json!("reload"));
        assert_eq!(out["success"], json!(false));
        assert_eq!(out["onReturn"], json!("reload"));
        assert_eq!(out["seed"], json!(1));
        assert_eq!(out["errors"], json!(["missing required fields: Name"]));
    }
}
