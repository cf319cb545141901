//! JSON Schemas for task outputs.
//!
//! Each task's schema is embedded at compile time and compiled once.

use std::sync::OnceLock;

use crate::types::Task;

const COMPLIANCE_SCHEMA_JSON: &str = include_str!("../../schemas/compliance.schema.json");
const BUSINESS_VALUE_SCHEMA_JSON: &str = include_str!("../../schemas/business_value.schema.json");
const TOOLS_SCHEMA_JSON: &str = include_str!("../../schemas/tools.schema.json");

type Compiled = Result<jsonschema::Validator, String>;

static COMPLIANCE: OnceLock<Compiled> = OnceLock::new();
static BUSINESS_VALUE: OnceLock<Compiled> = OnceLock::new();
static TOOLS: OnceLock<Compiled> = OnceLock::new();

fn compile(source: &str) -> Compiled {
    let schema_value: serde_json::Value =
        serde_json::from_str(source).map_err(|e| format!("Invalid schema JSON: {}", e))?;

    jsonschema::options()
        .build(&schema_value)
        .map_err(|e| format!("Failed to compile schema: {}", e))
}

/// Get the compiled validator for a task.
pub fn validator_for(task: Task) -> Result<&'static jsonschema::Validator, String> {
    let (cell, source) = match task {
        Task::Compliance => (&COMPLIANCE, COMPLIANCE_SCHEMA_JSON),
        Task::BusinessValue => (&BUSINESS_VALUE, BUSINESS_VALUE_SCHEMA_JSON),
        Task::Tools => (&TOOLS, TOOLS_SCHEMA_JSON),
    };

    cell.get_or_init(|| compile(source)).as_ref().map_err(|e| e.clone())
}

/// Validate a parsed value against a task schema.
///
/// Returns every violation, formatted with its instance path.
pub fn validate_task_value(task: Task, value: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = validator_for(task).map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
