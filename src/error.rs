//! Typed errors and their stable error codes.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing setting: {0}")]
    MissingSetting(&'static str),
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate entity name: {0}")]
    DuplicateEntity(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AccessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("class not found: {0}")]
    ClassNotFound(String),
    #[error("no entity of class <{entity}> with the id <{id}> could be found")]
    EntityNotFound { entity: String, id: String },
    #[error("no setter for field '{field}' on entity of class '{entity}'")]
    NoSuchSetter { entity: String, field: String },
    #[error("no method '{method}' on entity of class '{entity}'")]
    NoSuchMethod { entity: String, method: String },
    #[error("unknown field '{field}' on entity of class '{entity}'")]
    UnknownField { entity: String, field: String },
    #[error("the operator \"{0}\" is not defined")]
    UnsupportedOperator(String),
    #[error("wrong amount of expressions: expected {expected}, got {actual}")]
    ExpressionCountMismatch { expected: usize, actual: usize },
    #[error("malformed filter: {0}")]
    MalformedFilter(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("constant lookup: {0}")]
    ConstantLookup(String),
    #[error("entity of class '{0}' has no identifier value")]
    MissingIdentifier(String),
    #[error("cache: {0}")]
    Cache(String),
    #[error("backend: {0}")]
    Backend(String),
}

impl AccessError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::Config(_) => "config_error",
            AccessError::ClassNotFound(_) => "class_not_found",
            AccessError::EntityNotFound { .. } => "entity_not_found",
            AccessError::NoSuchSetter { .. } => "no_such_setter",
            AccessError::NoSuchMethod { .. } => "no_such_method",
            AccessError::UnknownField { .. } => "unknown_field",
            AccessError::UnsupportedOperator(_) => "unsupported_operator",
            AccessError::ExpressionCountMismatch { .. } => "expression_count_mismatch",
            AccessError::MalformedFilter(_) => "malformed_filter",
            AccessError::MalformedRequest(_) => "malformed_request",
            AccessError::TypeMismatch(_) => "type_mismatch",
            AccessError::ConstantLookup(_) => "constant_lookup",
            AccessError::MissingIdentifier(_) => "missing_identifier",
            AccessError::Cache(_) => "cache_error",
            AccessError::Backend(_) => "backend_error",
        }
    }

    /// `{"error": {"code", "message"}}` body for callers that report errors as JSON.
    pub fn error_body(&self) -> serde_json::Value {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        serde_json::to_value(body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
