//! Result persistence.
//!
//! The evaluation record is written first; the quota charge follows only once
//! that write has succeeded. The two writes are not one transaction.

use std::sync::Arc;

use autocheck_core::{EvaluationOutputs, EvaluationRequest};
use chrono::{DateTime, Utc};

use crate::quota::{QuotaEnforcer, QuotaTicket};
use crate::store::{EvaluationRecord, EvaluationStore, StoreError};

/// Writes accepted evaluations and charges the quota.
pub struct ResultPersister {
    evaluations: Arc<dyn EvaluationStore>,
    quota: Arc<QuotaEnforcer>,
}

impl ResultPersister {
    pub fn new(evaluations: Arc<dyn EvaluationStore>, quota: Arc<QuotaEnforcer>) -> Self {
        Self { evaluations, quota }
    }

    /// Persist one fully validated evaluation.
    ///
    /// A failed record write charges nothing. A failed quota charge after a
    /// durable record write is logged and does not fail the evaluation.
    pub async fn save(
        &self,
        user_id: &str,
        request: EvaluationRequest,
        outputs: EvaluationOutputs,
        ticket: &QuotaTicket,
        now: DateTime<Utc>,
    ) -> Result<EvaluationRecord, StoreError> {
        let record = EvaluationRecord::new(user_id, request, outputs, now);
        self.evaluations.insert(record.clone()).await?;

        tracing::info!(user_id = %user_id, evaluation_id = %record.id, "Evaluation persisted");

        if let Err(e) = self.quota.commit(ticket).await {
            tracing::error!(
                user_id = %user_id,
                evaluation_id = %record.id,
                error = %e,
                "Quota charge failed after evaluation was persisted"
            );
        }

        Ok(record)
    }
}
