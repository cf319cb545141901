//! Prompt texts for the three evaluation tasks.
//!
//! Each prompt ends with a literal JSON skeleton; the model is told to emit
//! only an object of that shape, and the output schemas in
//! `autocheck-core` enforce the same contract structurally.

use crate::config::PromptOverrides;
use crate::providers::ChatMessage;

/// Default system message for the compliance task.
pub const COMPLIANCE_SYSTEM_PROMPT: &str = "Du bist ein Compliance-Experte, der *ausschließlich* auf den folgenden Gesetzestext-Auszügen aus der DSGVO und dem EU AI Act basiert.";

/// Default system message for the business-value task.
pub const BUSINESS_VALUE_SYSTEM_PROMPT: &str = "Du bist ein erfahrener Business-Analyst.";

const COMPLIANCE_INSTRUCTIONS: &str = r#"1) Entscheide, ob KI verwendet wird (“yes”/“no”) und begründe kurz.
2) Klassifiziere DSGVO:
   - gdpr_status: "green" / "yellow" / "red"
   - gdpr_section: exakte Artikelnummer oder "-"
3) Klassifiziere EU AI Act:
   - Wenn KI verwendet: ai_act_status: "ok"/"warning"/"violation", plus ai_act_section
   - Sonst: ai_act_status: "ok", ai_act_section: "-"
4) Gib NUR JSON zurück mit:
{
  "gdpr_status":    "<string>",
  "gdpr_section":   "<string>",
  "ai_act_status":  "<string>",
  "ai_act_section": "<string>",
  "explanations": {
    "gdpr":   "<string>",
    "ai_act": "<string>"
  }
}"#;

const BUSINESS_VALUE_SKELETON: &str = r#"Gib NUR JSON zurück:
{
  "score": <float>,
  "narrative": "<string>"
}"#;

const TOOLS_SKELETON: &str = r#"Gib NUR JSON zurück:
{
  "recommendations": [
    { "tool": "<string>", "reason": "<string>" },
    { "tool": "<string>", "reason": "<string>" },
    { "tool": "<string>", "reason": "<string>" }
  ]
}"#;

/// A rendered prompt: optional system message plus the user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessages {
    pub system: Option<String>,
    pub user: String,
}

impl PromptMessages {
    /// Chat messages in send order.
    pub fn into_messages(self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(self.user));
        messages
    }
}

/// Renders the task prompts. Rendering is pure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBuilder {
    compliance_system: String,
    business_value_system: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            compliance_system: COMPLIANCE_SYSTEM_PROMPT.to_string(),
            business_value_system: BUSINESS_VALUE_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: &PromptOverrides) -> Self {
        let defaults = Self::default();
        Self {
            compliance_system: overrides
                .compliance_system
                .clone()
                .unwrap_or(defaults.compliance_system),
            business_value_system: overrides
                .business_value_system
                .clone()
                .unwrap_or(defaults.business_value_system),
        }
    }

    /// Excerpts verbatim, then the instructions, then the description.
    pub fn compliance_prompt(&self, excerpts: &str, description: &str) -> PromptMessages {
        let user = format!(
            "Auszüge:\n{}\n\n{}\n\nBewerte: \"\"\"{}\"\"\"",
            excerpts, COMPLIANCE_INSTRUCTIONS, description
        );
        PromptMessages {
            system: Some(self.compliance_system.clone()),
            user,
        }
    }

    pub fn business_value_prompt(
        &self,
        time_required: &str,
        frequency: &str,
        stakeholder: &str,
    ) -> PromptMessages {
        let user = format!(
            "Du bist ein Analyst. Berechne einen Business-Value-Score aus:\n\
             - time_required: {}\n\
             - frequency: {}\n\
             - stakeholder: {}\n\n\
             {}\n",
            time_required, frequency, stakeholder, BUSINESS_VALUE_SKELETON
        );
        PromptMessages {
            system: Some(self.business_value_system.clone()),
            user,
        }
    }

    /// The tools prompt carries no system message.
    pub fn tools_prompt(&self, description: &str, applications: &str) -> PromptMessages {
        let applications = if applications.is_empty() { "-" } else { applications };
        let user = format!(
            "Du bist ein Automation-Architekt. Empfiehl die Top-3 Tools (mit Gründen) für:\n\
             - Beschreibung: \"\"\"{}\"\"\"\n\
             - Bestehende Apps: {}\n\n\
             {}\n",
            description, applications, TOOLS_SKELETON
        );
        PromptMessages { system: None, user }
    }
}
