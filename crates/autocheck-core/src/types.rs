//! Data model shared by every stage of an evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated evaluation request.
///
/// Built only through [`RequestValidator`](crate::RequestValidator); immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    /// Free-text description of the business process
    pub description: String,

    /// Applications currently in use (free text, may be empty)
    #[serde(default)]
    pub applications: String,

    /// Time the process takes per run (category label)
    pub time_required: String,

    /// How often the process runs (category label)
    pub frequency: String,

    /// Who performs the process (category label)
    pub stakeholder: String,
}

/// Caller role as reported by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// Resolve a stored profile role; anything other than `"admin"` is a plain user.
    pub fn from_profile(role: Option<&str>) -> Self {
        match role {
            Some(r) if r.eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three independent assessments produced per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Compliance,
    BusinessValue,
    Tools,
}

impl Task {
    pub const ALL: [Task; 3] = [Task::Compliance, Task::BusinessValue, Task::Tools];

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Compliance => "compliance",
            Task::BusinessValue => "business_value",
            Task::Tools => "tools",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GDPR traffic-light classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GdprStatus {
    Green,
    Yellow,
    Red,
}

/// EU AI Act classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiActStatus {
    Ok,
    Warning,
    Violation,
}

/// Free-text justification for each compliance classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceExplanations {
    pub gdpr: String,
    pub ai_act: String,
}

/// Regulatory classification grounded in retrieved legal excerpts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub gdpr_status: GdprStatus,

    /// Article reference, `"-"` when not applicable
    pub gdpr_section: String,

    pub ai_act_status: AiActStatus,

    pub ai_act_section: String,

    pub explanations: ComplianceExplanations,
}

/// Business-value score with narrative.
///
/// The score is intended to fall within 0-100 but is not range-checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessValueResult {
    #[serde(serialize_with = "serialize_score")]
    pub score: f64,
    pub narrative: String,
}

/// Whole scores go out as integers (`42`, not `42.0`), matching what the model sent.
fn serialize_score<S: serde::Serializer>(score: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    const I64_RANGE: f64 = 9.0e15;
    if score.fract() == 0.0 && score.abs() < I64_RANGE {
        serializer.serialize_i64(*score as i64)
    } else {
        serializer.serialize_f64(*score)
    }
}

/// A single tool suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRecommendation {
    pub tool: String,
    pub reason: String,
}

/// Ranked tool recommendations, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsResult {
    pub recommendations: Vec<ToolRecommendation>,
}

/// All three task results. Only ever constructed from three validated results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutputs {
    pub compliance: ComplianceResult,

    #[serde(rename = "businessValue")]
    pub business_value: BusinessValueResult,

    pub tools: ToolsResult,
}
