//! Concurrent inference for the three evaluation tasks.
//!
//! # Architecture
//! - Three named tasks (compliance, business value, tools) run concurrently
//! - Compliance first gathers its grounding excerpts; retrieval never fails it
//! - Each reply is parsed, repaired once if needed, and schema-validated
//! - Join policy is all-or-nothing: the first failing task aborts the run and
//!   the remaining in-flight calls are dropped

use std::sync::Arc;
use std::time::{Duration, Instant};

use autocheck_core::{
    parse_task_output, BusinessValueResult, ComplianceResult, EvaluationOutputs,
    EvaluationRequest, OutputError, Task, TaskOutput, ToolsResult,
};
use backon::{ExponentialBuilder, Retryable};
use thiserror::Error;

use crate::config::{RuntimeConfig, CHAT_MODEL_ENV};
use crate::prompts::{PromptBuilder, PromptMessages};
use crate::providers::{ChatProvider, CompletionConfig, CompletionResponse, ProviderError};
use crate::retrieval::RetrievalAugmenter;

/// Errors that abort an inference run.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("{task} call failed: {source}")]
    Provider {
        task: Task,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl InferenceError {
    pub fn task(&self) -> Task {
        match self {
            InferenceError::Provider { task, .. } => *task,
            InferenceError::Output(e) => e.task(),
        }
    }
}

/// Fans out the three task calls and joins them.
pub struct InferenceOrchestrator {
    chat: Arc<dyn ChatProvider>,
    retrieval: Option<RetrievalAugmenter>,
    prompts: PromptBuilder,
    compliance: CompletionConfig,
    business_value: CompletionConfig,
    tools: CompletionConfig,
    timeout: Option<Duration>,
    max_retries: u32,
}

impl InferenceOrchestrator {
    /// Orchestrator with default parameters, no retrieval, no timeout and no retries.
    pub fn new(chat: Arc<dyn ChatProvider>) -> Self {
        Self {
            chat,
            retrieval: None,
            prompts: PromptBuilder::default(),
            compliance: CompletionConfig::default(),
            business_value: CompletionConfig::default(),
            tools: CompletionConfig::default(),
            timeout: None,
            max_retries: 0,
        }
    }

    /// Build from runtime configuration.
    ///
    /// Reads `OPENAI_CHAT_MODEL` once for tasks without an explicit model.
    pub fn from_config(
        chat: Arc<dyn ChatProvider>,
        retrieval: Option<RetrievalAugmenter>,
        config: &RuntimeConfig,
    ) -> Self {
        let env_model = std::env::var(CHAT_MODEL_ENV).ok();
        let env_model = env_model.as_deref();
        let inference = &config.inference;

        Self {
            chat,
            retrieval,
            prompts: PromptBuilder::with_overrides(&config.prompts),
            compliance: inference.completion_config(Task::Compliance, env_model),
            business_value: inference.completion_config(Task::BusinessValue, env_model),
            tools: inference.completion_config(Task::Tools, env_model),
            timeout: inference.timeout,
            max_retries: inference.max_retries,
        }
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalAugmenter) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_task_config(mut self, task: Task, config: CompletionConfig) -> Self {
        match task {
            Task::Compliance => self.compliance = config,
            Task::BusinessValue => self.business_value = config,
            Task::Tools => self.tools = config,
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Run all three tasks; succeed only if every one validates.
    pub async fn run(&self, request: &EvaluationRequest) -> Result<EvaluationOutputs, InferenceError> {
        let started = Instant::now();

        let compliance = async {
            let excerpts = match &self.retrieval {
                Some(retrieval) => retrieval.retrieve(&request.description).await,
                None => String::new(),
            };
            let prompt = self.prompts.compliance_prompt(&excerpts, &request.description);
            self.run_task::<ComplianceResult>(prompt, &self.compliance).await
        };

        let business_value = self.run_task::<BusinessValueResult>(
            self.prompts.business_value_prompt(
                &request.time_required,
                &request.frequency,
                &request.stakeholder,
            ),
            &self.business_value,
        );

        let tools = self.run_task::<ToolsResult>(
            self.prompts
                .tools_prompt(&request.description, &request.applications),
            &self.tools,
        );

        let (compliance, business_value, tools) =
            tokio::try_join!(compliance, business_value, tools)?;

        tracing::info!(
            latency_ms = started.elapsed().as_millis() as u64,
            "All evaluation tasks validated"
        );

        Ok(EvaluationOutputs {
            compliance,
            business_value,
            tools,
        })
    }

    async fn run_task<T: TaskOutput>(
        &self,
        prompt: PromptMessages,
        config: &CompletionConfig,
    ) -> Result<T, InferenceError> {
        let task = T::TASK;
        let started = Instant::now();

        let response = self.complete_with_retry(task, prompt, config).await?;

        tracing::info!(
            task = %task,
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            total_tokens = response.usage.total(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Completion received"
        );

        // Validation failures are terminal; they are never retried
        parse_task_output::<T>(&response.content).map_err(|e| {
            tracing::warn!(task = %task, error = %e, "Task output rejected");
            InferenceError::Output(e)
        })
    }

    async fn complete_with_retry(
        &self,
        task: Task,
        prompt: PromptMessages,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, InferenceError> {
        let messages = prompt.into_messages();

        let attempt = || self.complete_once(messages.clone(), config);

        let result = if self.max_retries == 0 {
            attempt().await
        } else {
            attempt
                .retry(ExponentialBuilder::default().with_max_times(self.max_retries as usize))
                .when(ProviderError::is_transient)
                .notify(|err: &ProviderError, dur: Duration| {
                    tracing::warn!(task = %task, error = %err, delay = ?dur, "Retrying provider call");
                })
                .await
        };

        result.map_err(|source| InferenceError::Provider { task, source })
    }

    async fn complete_once(
        &self,
        messages: Vec<crate::providers::ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let call = self.chat.complete(messages, config);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ProviderError::Timeout(limit))?,
            None => call.await,
        }
    }
}
