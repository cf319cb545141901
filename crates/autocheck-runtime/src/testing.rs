//! In-process mock providers shared by the runtime's unit tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use autocheck_core::{EvaluationRequest, Task};
use parking_lot::Mutex;

use crate::providers::{
    ChatMessage, ChatProvider, CompletionConfig, CompletionResponse, EmbeddingProvider,
    ProviderError, TokenUsage,
};

pub fn invoice_request() -> EvaluationRequest {
    EvaluationRequest {
        description: "We manually copy invoice data from email attachments into our ERP every day"
            .to_string(),
        applications: String::new(),
        time_required: "30–60 min".to_string(),
        frequency: "täglich".to_string(),
        stakeholder: "mein Team".to_string(),
    }
}

pub fn invoice_payload() -> serde_json::Value {
    serde_json::json!({
        "description": "We manually copy invoice data from email attachments into our ERP every day",
        "timeRequired": "30–60 min",
        "frequency": "täglich",
        "stakeholder": "mein Team"
    })
}

pub fn compliance_json(gdpr_status: &str, ai_act_status: &str) -> String {
    serde_json::json!({
        "gdpr_status": gdpr_status,
        "gdpr_section": "Art. 6",
        "ai_act_status": ai_act_status,
        "ai_act_section": "-",
        "explanations": {
            "gdpr": "Rechnungen enthalten personenbezogene Daten",
            "ai_act": "Keine KI im Einsatz"
        }
    })
    .to_string()
}

const BUSINESS_VALUE_JSON: &str = r#"{"score": 42, "narrative": "Hoher manueller Aufwand"}"#;

const TOOLS_JSON: &str = r#"{"recommendations": [
    {"tool": "Zapier", "reason": "Mail-Trigger"},
    {"tool": "n8n", "reason": "Self-hosted"},
    {"tool": "UiPath", "reason": "ERP-Eingabe"}
]}"#;

/// Identify which task a prompt belongs to.
pub fn task_of(messages: &[ChatMessage]) -> Task {
    let user = messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    if user.starts_with("Auszüge:") {
        Task::Compliance
    } else if user.contains("Business-Value-Score") {
        Task::BusinessValue
    } else {
        Task::Tools
    }
}

#[derive(Default)]
struct Script {
    reply: String,
    failures: VecDeque<ProviderError>,
    always_fail: Option<ProviderError>,
    hang: bool,
}

struct Call {
    task: Task,
    messages: Vec<ChatMessage>,
    config: CompletionConfig,
}

/// Chat provider with per-task scripted replies and a call log.
pub struct ScriptedChat {
    scripts: Mutex<HashMap<Task, Script>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedChat {
    /// All three tasks reply with valid JSON.
    pub fn valid() -> Self {
        let mut scripts = HashMap::new();
        for (task, reply) in [
            (Task::Compliance, compliance_json("yellow", "ok")),
            (Task::BusinessValue, BUSINESS_VALUE_JSON.to_string()),
            (Task::Tools, TOOLS_JSON.to_string()),
        ] {
            scripts.insert(
                task,
                Script {
                    reply,
                    ..Default::default()
                },
            );
        }
        Self {
            scripts: Mutex::new(scripts),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn edit(self, task: Task, f: impl FnOnce(&mut Script)) -> Self {
        f(self.scripts.lock().entry(task).or_default());
        self
    }

    pub fn reply(self, task: Task, reply: &str) -> Self {
        let reply = reply.to_string();
        self.edit(task, |s| s.reply = reply)
    }

    pub fn fail(self, task: Task, error: ProviderError) -> Self {
        self.edit(task, |s| s.always_fail = Some(error))
    }

    pub fn fail_times(self, task: Task, times: usize, error: ProviderError) -> Self {
        self.edit(task, |s| s.failures.extend(std::iter::repeat(error).take(times)))
    }

    pub fn hang(self, task: Task) -> Self {
        self.edit(task, |s| s.hang = true)
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, task: Task) -> usize {
        self.calls.lock().iter().filter(|c| c.task == task).count()
    }

    pub fn last_user_prompt(&self, task: Task) -> Option<String> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|c| c.task == task)
            .and_then(|c| c.messages.iter().find(|m| m.role == "user"))
            .map(|m| m.content.clone())
    }

    pub fn last_config(&self, task: Task) -> Option<CompletionConfig> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|c| c.task == task)
            .map(|c| c.config.clone())
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let task = task_of(&messages);
        self.calls.lock().push(Call {
            task,
            messages,
            config: config.clone(),
        });

        let outcome = {
            let mut scripts = self.scripts.lock();
            let script = scripts.entry(task).or_default();
            if script.hang {
                None
            } else if let Some(err) = script.always_fail.clone() {
                Some(Err(err))
            } else if let Some(err) = script.failures.pop_front() {
                Some(Err(err))
            } else {
                Some(Ok(script.reply.clone()))
            }
        };

        match outcome {
            None => std::future::pending().await,
            Some(Err(err)) => Err(err),
            Some(Ok(content)) => Ok(CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 120,
                    completion_tokens: 40,
                },
                model: config.model.clone(),
                finish_reason: Some("stop".to_string()),
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Embedding provider returning a fixed vector or a fixed error.
pub struct FixedEmbedder {
    vector: Result<Vec<f32>, ProviderError>,
}

impl FixedEmbedder {
    pub fn ok(vector: Vec<f32>) -> Self {
        Self { vector: Ok(vector) }
    }

    pub fn failing() -> Self {
        Self {
            vector: Err(ProviderError::HttpError("connection refused".to_string())),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str, _model: &str) -> Result<Vec<f32>, ProviderError> {
        self.vector.clone()
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
