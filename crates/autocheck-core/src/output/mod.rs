//! Parsing and validation of raw model replies.
//!
//! # Core Principle
//! A task result exists only if it passed its schema.
//!
//! The pipeline per reply is: strict JSON parse, then (on failure) one
//! tolerant repair pass and a second parse, then strict schema validation,
//! then typed decoding. Schema failures are terminal; they are never
//! repaired or retried.

mod repair;
mod schema;

pub use repair::repair;
pub use schema::{validate_task_value, validator_for};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::types::{BusinessValueResult, ComplianceResult, Task, ToolsResult};

/// Errors from output parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OutputError {
    #[error("{task} reply is not JSON even after repair: {reason}")]
    Unparseable { task: Task, reason: String },

    #[error("{task} reply violates its schema: {}", .violations.join("; "))]
    SchemaViolation { task: Task, violations: Vec<String> },
}

impl OutputError {
    pub fn task(&self) -> Task {
        match self {
            OutputError::Unparseable { task, .. } | OutputError::SchemaViolation { task, .. } => {
                *task
            }
        }
    }
}

/// A typed task result with a declarative schema.
pub trait TaskOutput: DeserializeOwned + Send + 'static {
    /// The task this output belongs to.
    const TASK: Task;
}

impl TaskOutput for ComplianceResult {
    const TASK: Task = Task::Compliance;
}

impl TaskOutput for BusinessValueResult {
    const TASK: Task = Task::BusinessValue;
}

impl TaskOutput for ToolsResult {
    const TASK: Task = Task::Tools;
}

/// Parse a raw reply into structured JSON, applying the repair pass once.
pub fn parse_lenient(task: Task, raw: &str) -> Result<serde_json::Value, OutputError> {
    match serde_json::from_str(raw) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            tracing::debug!(task = %task, error = %strict_err, "Strict parse failed, repairing");
            serde_json::from_str(&repair(raw)).map_err(|e| OutputError::Unparseable {
                task,
                reason: e.to_string(),
            })
        }
    }
}

/// Parse, repair if needed, and validate a raw reply into a typed result.
pub fn parse_task_output<T: TaskOutput>(raw: &str) -> Result<T, OutputError> {
    let value = parse_lenient(T::TASK, raw)?;

    validate_task_value(T::TASK, &value).map_err(|violations| OutputError::SchemaViolation {
        task: T::TASK,
        violations,
    })?;

    serde_json::from_value(value).map_err(|e| OutputError::SchemaViolation {
        task: T::TASK,
        violations: vec![e.to_string()],
    })
}
