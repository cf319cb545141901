//! In-process store.

use std::collections::HashMap;

use async_trait::async_trait;
use autocheck_core::QuotaRecord;
use chrono::NaiveDate;
use parking_lot::Mutex;

use super::{
    release_in_place, reserve_in_place, EvaluationRecord, EvaluationStore, QuotaStore,
    Reservation, StoreError,
};

/// Quota and evaluation store held in memory.
///
/// Each operation takes its lock once, so `reserve` is atomic per process.
#[derive(Default)]
pub struct MemoryStore {
    quotas: Mutex<HashMap<String, QuotaRecord>>,
    evaluations: Mutex<Vec<EvaluationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total evaluations held, across users.
    pub fn evaluation_count(&self) -> usize {
        self.evaluations.lock().len()
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Result<Option<QuotaRecord>, StoreError> {
        Ok(self.quotas.lock().get(user_id).cloned())
    }

    async fn put(&self, record: QuotaRecord) -> Result<(), StoreError> {
        self.quotas.lock().insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn reserve(
        &self,
        user_id: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<Reservation, StoreError> {
        let mut quotas = self.quotas.lock();
        let (outcome, next) = reserve_in_place(quotas.get(user_id), user_id, day, limit);
        if let Some(record) = next {
            quotas.insert(user_id.to_string(), record);
        }
        Ok(outcome)
    }

    async fn release(&self, user_id: &str, day: NaiveDate) -> Result<(), StoreError> {
        let mut quotas = self.quotas.lock();
        if let Some(record) = release_in_place(quotas.get(user_id), day) {
            quotas.insert(user_id.to_string(), record);
        }
        Ok(())
    }
}

#[async_trait]
impl EvaluationStore for MemoryStore {
    async fn insert(&self, record: EvaluationRecord) -> Result<(), StoreError> {
        self.evaluations.lock().push(record);
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EvaluationRecord>, StoreError> {
        let evaluations = self.evaluations.lock();
        Ok(evaluations
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}
