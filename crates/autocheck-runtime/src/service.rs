//! The evaluation pipeline end to end.
//!
//! # Execution Flow
//! 1. Caller must be authenticated
//! 2. Payload is validated into an [`EvaluationRequest`]
//! 3. Quota admission, before any inference spend
//! 4. Three concurrent task calls, all-or-nothing
//! 5. Record written, then quota charged
//!
//! Steps 1-3 fail with no side effects. A failure in step 4 or 5 persists
//! nothing and charges nothing.

use std::sync::Arc;

use autocheck_core::{
    EvaluationOutputs, EvaluationRequest, FieldIssue, OutputError, RequestValidator, Task,
    ValidationError,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::RuntimeConfig;
use crate::identity::Caller;
use crate::orchestrator::{InferenceError, InferenceOrchestrator};
use crate::persist::ResultPersister;
use crate::providers::ProviderError;
use crate::quota::{QuotaEnforcer, QuotaError, QuotaStatus, QuotaTicket};
use crate::store::{EvaluationRecord, EvaluationStore, QuotaStore, StoreError};

/// Everything that can end an evaluation request.
#[derive(Error, Debug)]
pub enum EvaluateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Daily quota exceeded ({count}/{limit})")]
    QuotaExceeded { count: u32, limit: u32 },

    #[error(transparent)]
    MalformedOutput(OutputError),

    #[error("{task} provider call failed: {source}")]
    Provider {
        task: Task,
        #[source]
        source: ProviderError,
    },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl EvaluateError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EvaluateError::Validation(ValidationError::Schema(_)) => 500,
            EvaluateError::Validation(_) => 400,
            EvaluateError::Unauthenticated => 401,
            EvaluateError::QuotaExceeded { .. } => 429,
            EvaluateError::MalformedOutput(_)
            | EvaluateError::Provider { .. }
            | EvaluateError::Persistence(_) => 500,
        }
    }

    /// Message safe to show the caller. Server-side failures stay generic.
    pub fn public_message(&self) -> &'static str {
        match self {
            EvaluateError::Validation(ValidationError::MalformedJson(_)) => "Invalid JSON",
            EvaluateError::Validation(ValidationError::Schema(_)) => "Evaluation failed",
            EvaluateError::Validation(_) => "Invalid request",
            EvaluateError::Unauthenticated => "Unauthenticated",
            EvaluateError::QuotaExceeded { .. } => "Daily quota exceeded",
            EvaluateError::MalformedOutput(_)
            | EvaluateError::Provider { .. }
            | EvaluateError::Persistence(_) => "Evaluation failed",
        }
    }

    /// Machine-readable field details (validation errors only).
    pub fn details(&self) -> Option<Vec<FieldIssue>> {
        match self {
            EvaluateError::Validation(e @ ValidationError::Fields(_))
            | EvaluateError::Validation(e @ ValidationError::MalformedJson(_)) => Some(e.issues()),
            _ => None,
        }
    }

    /// Whether the failure is on the server side.
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

impl From<InferenceError> for EvaluateError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::Provider { task, source } => EvaluateError::Provider { task, source },
            InferenceError::Output(e) => EvaluateError::MalformedOutput(e),
        }
    }
}

impl From<QuotaError> for EvaluateError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::Exceeded { count, limit } => EvaluateError::QuotaExceeded { count, limit },
            QuotaError::Store(e) => EvaluateError::Persistence(e),
        }
    }
}

/// Top-level evaluation service.
pub struct EvaluationService {
    validator: RequestValidator,
    quota: Arc<QuotaEnforcer>,
    orchestrator: InferenceOrchestrator,
    persister: ResultPersister,
    evaluations: Arc<dyn EvaluationStore>,
}

impl EvaluationService {
    pub fn new(
        validator: RequestValidator,
        quota: QuotaEnforcer,
        orchestrator: InferenceOrchestrator,
        evaluations: Arc<dyn EvaluationStore>,
    ) -> Self {
        let quota = Arc::new(quota);
        let persister = ResultPersister::new(Arc::clone(&evaluations), Arc::clone(&quota));
        Self {
            validator,
            quota,
            orchestrator,
            persister,
            evaluations,
        }
    }

    /// Wire a service from configuration and already-built collaborators.
    pub fn from_config(
        config: &RuntimeConfig,
        orchestrator: InferenceOrchestrator,
        quota_store: Arc<dyn QuotaStore>,
        evaluations: Arc<dyn EvaluationStore>,
    ) -> Result<Self, ValidationError> {
        let validator = RequestValidator::new(config.validation.min_description_chars)?;
        let quota = QuotaEnforcer::from_config(quota_store, &config.quota);
        Ok(Self::new(validator, quota, orchestrator, evaluations))
    }

    /// Evaluate a raw JSON payload for a caller.
    pub async fn evaluate(
        &self,
        caller: Option<&Caller>,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutputs, EvaluateError> {
        let caller = caller.ok_or(EvaluateError::Unauthenticated)?;

        let request = self.validator.validate_bytes(payload).map_err(|e| {
            tracing::info!(user_id = %caller.user_id, error = %e, "Request rejected");
            e
        })?;

        let ticket = self
            .quota
            .check_and_peek(&caller.user_id, caller.role, now)
            .await?;

        match self.run_admitted(caller, request, &ticket, now).await {
            Ok(outputs) => Ok(outputs),
            Err(e) => {
                tracing::error!(user_id = %caller.user_id, error = %e, "Evaluation failed");
                if let Err(release_err) = self.quota.abandon(&ticket).await {
                    tracing::error!(
                        user_id = %caller.user_id,
                        error = %release_err,
                        "Failed to release quota slot"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_admitted(
        &self,
        caller: &Caller,
        request: EvaluationRequest,
        ticket: &QuotaTicket,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutputs, EvaluateError> {
        let outputs = self.orchestrator.run(&request).await?;
        self.persister
            .save(&caller.user_id, request, outputs.clone(), ticket, now)
            .await?;
        Ok(outputs)
    }

    /// The caller's persisted evaluations, newest first.
    pub async fn history(&self, caller: Option<&Caller>) -> Result<Vec<EvaluationRecord>, EvaluateError> {
        let caller = caller.ok_or(EvaluateError::Unauthenticated)?;
        Ok(self.evaluations.list_for_user(&caller.user_id).await?)
    }

    /// The caller's usage on the current reference day.
    pub async fn quota_status(
        &self,
        caller: Option<&Caller>,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, EvaluateError> {
        let caller = caller.ok_or(EvaluateError::Unauthenticated)?;
        Ok(self.quota.status(&caller.user_id, caller.role, now).await?)
    }
}
