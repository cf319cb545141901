//! # autocheck-core
//!
//! Deterministic building blocks for process evaluations.
//!
//! This crate answers the questions that never need a model:
//! - Is this evaluation request well-formed?
//! - Can this raw model reply be turned into a typed result?
//! - Which reference-timezone day is it, and how much quota is left?
//!
//! ## Key Guarantees
//!
//! 1. **No I/O**: nothing here talks to a provider, a store or the network
//! 2. **Strict outputs**: a task result exists only if it passed its schema
//! 3. **Explicit days**: quota days come from a timezone-aware computation,
//!    never from locale-formatted text
//!
//! ## Example
//!
//! ```rust,ignore
//! use autocheck_core::{parse_task_output, BusinessValueResult, RequestValidator};
//!
//! let validator = RequestValidator::new(5)?;
//! let request = validator.validate(&payload)?;
//!
//! let result: BusinessValueResult =
//!     parse_task_output("```json\n{\"score\": 42, \"narrative\": \"ok\",}\n```")?;
//! assert_eq!(result.score, 42.0);
//! ```

pub mod output;
pub mod quota;
pub mod request;
pub mod types;

// Re-export main types at crate root
pub use output::{parse_task_output, repair, OutputError, TaskOutput};
pub use quota::{
    effective_count, reference_day, QuotaPolicy, QuotaRecord, DEFAULT_DAILY_LIMIT, DEFAULT_TIMEZONE,
};
pub use request::{FieldIssue, RequestValidator, ValidationError, DEFAULT_MIN_DESCRIPTION_CHARS};
pub use types::{
    AiActStatus, BusinessValueResult, ComplianceExplanations, ComplianceResult,
    EvaluationOutputs, EvaluationRequest, GdprStatus, Role, Task, ToolRecommendation, ToolsResult,
};
