//! Evaluation request validation.
//!
//! Incoming payloads are checked against a JSON Schema and then decoded into
//! a typed [`EvaluationRequest`]. Unknown extra fields are ignored.

use jsonschema::error::ValidationErrorKind;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::types::EvaluationRequest;

/// Server-side floor for the description length, in characters.
pub const DEFAULT_MIN_DESCRIPTION_CHARS: usize = 5;

/// One offending field in a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    /// Field name (`"body"` when the problem is the payload as a whole)
    pub field: String,

    pub message: String,
}

/// Errors from request validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid JSON: {0}")]
    MalformedJson(String),

    #[error("Invalid request: {}", summarize(.0))]
    Fields(Vec<FieldIssue>),

    #[error("Request schema unavailable: {0}")]
    Schema(String),
}

impl ValidationError {
    /// Machine-readable details for the caller.
    pub fn issues(&self) -> Vec<FieldIssue> {
        match self {
            ValidationError::Fields(issues) => issues.clone(),
            ValidationError::MalformedJson(msg) => vec![FieldIssue {
                field: "body".to_string(),
                message: msg.clone(),
            }],
            ValidationError::Schema(_) => Vec::new(),
        }
    }
}

fn summarize(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.field, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validates raw payloads into [`EvaluationRequest`]s.
///
/// The schema is compiled once per validator and reused for every request.
pub struct RequestValidator {
    schema: jsonschema::Validator,
    min_description_chars: usize,
}

impl RequestValidator {
    /// Build a validator enforcing the given minimum description length.
    pub fn new(min_description_chars: usize) -> Result<Self, ValidationError> {
        let schema_value = request_schema(min_description_chars);
        let schema = jsonschema::options()
            .build(&schema_value)
            .map_err(|e| ValidationError::Schema(e.to_string()))?;

        Ok(Self {
            schema,
            min_description_chars,
        })
    }

    pub fn min_description_chars(&self) -> usize {
        self.min_description_chars
    }

    /// Validate raw request bytes.
    pub fn validate_bytes(&self, body: &[u8]) -> Result<EvaluationRequest, ValidationError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
        self.validate(&value)
    }

    /// Validate a decoded payload.
    pub fn validate(&self, payload: &Value) -> Result<EvaluationRequest, ValidationError> {
        let issues: Vec<FieldIssue> = self
            .schema
            .iter_errors(payload)
            .map(|e| FieldIssue {
                field: field_name(&e.instance_path.to_string(), &e.kind),
                message: e.to_string(),
            })
            .collect();

        if !issues.is_empty() {
            return Err(ValidationError::Fields(issues));
        }

        serde_json::from_value(payload.clone()).map_err(|e| {
            ValidationError::Fields(vec![FieldIssue {
                field: "body".to_string(),
                message: e.to_string(),
            }])
        })
    }
}

impl Default for RequestValidator {
    fn default() -> Self {
        // The built-in schema is a literal; compiling it cannot fail.
        Self::new(DEFAULT_MIN_DESCRIPTION_CHARS).expect("built-in request schema compiles")
    }
}

impl EvaluationRequest {
    /// Validate a payload with a one-off validator.
    ///
    /// Long-lived callers should hold a [`RequestValidator`] instead.
    pub fn from_value(payload: &Value, min_description_chars: usize) -> Result<Self, ValidationError> {
        RequestValidator::new(min_description_chars)?.validate(payload)
    }
}

fn request_schema(min_description_chars: usize) -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["description", "timeRequired", "frequency", "stakeholder"],
        "properties": {
            "description": { "type": "string", "minLength": min_description_chars },
            "applications": { "type": "string" },
            "timeRequired": { "type": "string" },
            "frequency": { "type": "string" },
            "stakeholder": { "type": "string" }
        }
    })
}

fn field_name(instance_path: &str, kind: &ValidationErrorKind) -> String {
    let trimmed = instance_path.trim_start_matches('/');
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    match kind {
        ValidationErrorKind::Required { property } => property
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| property.to_string()),
        _ => "body".to_string(),
    }
}
