//! Durable storage for quota records and evaluation records.
//!
//! Both stores are traits so the service can run on the in-memory backend in
//! tests and on the file backend (or anything else) in deployment.

use async_trait::async_trait;
use autocheck_core::{EvaluationOutputs, EvaluationRequest, QuotaRecord};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors from a store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store data corrupt: {0}")]
    Corrupt(String),
}

/// Outcome of an atomic slot reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// A slot was claimed; `count_before` is today's usage before the claim
    Granted { count_before: u32 },

    /// The ceiling was already reached; nothing was written
    Denied { count: u32 },
}

/// Quota records, one per user.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<QuotaRecord>, StoreError>;

    /// Replace the user's record.
    async fn put(&self, record: QuotaRecord) -> Result<(), StoreError>;

    /// Increment-if-below-ceiling as one step.
    ///
    /// A record dated before `day` counts as zero and is replaced.
    async fn reserve(&self, user_id: &str, day: NaiveDate, limit: u32)
        -> Result<Reservation, StoreError>;

    /// Give back a slot claimed by [`reserve`](Self::reserve) on `day`.
    ///
    /// A no-op when the record has since rolled over to another day.
    async fn release(&self, user_id: &str, day: NaiveDate) -> Result<(), StoreError>;
}

/// One accepted request together with its validated outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub input: EvaluationRequest,
    pub outputs: EvaluationOutputs,
}

impl EvaluationRecord {
    pub fn new(
        user_id: impl Into<String>,
        input: EvaluationRequest,
        outputs: EvaluationOutputs,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            created_at,
            input,
            outputs,
        }
    }
}

/// Persisted evaluations.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn insert(&self, record: EvaluationRecord) -> Result<(), StoreError>;

    /// The user's evaluations, newest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EvaluationRecord>, StoreError>;
}

/// Apply the reservation rule to an in-hand record.
///
/// Shared by backends that serialize access with their own lock.
pub(crate) fn reserve_in_place(
    existing: Option<&QuotaRecord>,
    user_id: &str,
    day: NaiveDate,
    limit: u32,
) -> (Reservation, Option<QuotaRecord>) {
    let count = autocheck_core::effective_count(existing, day);
    if count >= limit {
        return (Reservation::Denied { count }, None);
    }
    let next = QuotaRecord {
        user_id: user_id.to_string(),
        date: day,
        count: count + 1,
    };
    (Reservation::Granted { count_before: count }, Some(next))
}

/// Apply the release rule to an in-hand record.
pub(crate) fn release_in_place(existing: Option<&QuotaRecord>, day: NaiveDate) -> Option<QuotaRecord> {
    match existing {
        Some(r) if r.date == day && r.count > 0 => Some(QuotaRecord {
            count: r.count - 1,
            ..r.clone()
        }),
        _ => None,
    }
}
