//! Daily quota enforcement.
//!
//! Admission happens before any inference call. What admission writes depends
//! on [`QuotaAccounting`]:
//! - `reference`: nothing; a successful evaluation later writes
//!   `count + 1` for the day read at admission. Concurrent requests from one
//!   user may be admitted on the same count.
//! - `reserve`: one atomic increment-if-below-ceiling; a failed evaluation
//!   gives its slot back.

use std::sync::Arc;

use autocheck_core::{effective_count, reference_day, QuotaPolicy, Role};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;

use crate::config::{QuotaAccounting, QuotaConfig};
use crate::store::{QuotaStore, Reservation, StoreError};

/// Errors from quota admission.
#[derive(Error, Debug)]
pub enum QuotaError {
    #[error("Daily quota exceeded ({count}/{limit})")]
    Exceeded { count: u32, limit: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How an admitted request is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    /// Exempt role; nothing is read back or written
    Exempt,

    /// Write `count + 1` on commit
    Deferred,

    /// Slot already claimed; release on abandon
    Reserved,
}

/// Proof of admission, carried to commit or abandon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaTicket {
    pub user_id: String,

    /// Reference day the request was admitted on
    pub day: NaiveDate,

    /// Effective usage before this request
    pub count: u32,

    pub charge: Charge,
}

/// Caller-facing usage summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub date: NaiveDate,
    pub exempt: bool,
}

/// Checks and charges the per-user daily ceiling.
pub struct QuotaEnforcer {
    store: Arc<dyn QuotaStore>,
    policy: QuotaPolicy,
    timezone: Tz,
    accounting: QuotaAccounting,
}

impl QuotaEnforcer {
    pub fn new(
        store: Arc<dyn QuotaStore>,
        policy: QuotaPolicy,
        timezone: Tz,
        accounting: QuotaAccounting,
    ) -> Self {
        Self {
            store,
            policy,
            timezone,
            accounting,
        }
    }

    pub fn from_config(store: Arc<dyn QuotaStore>, config: &QuotaConfig) -> Self {
        Self::new(
            store,
            QuotaPolicy::new(config.daily_limit, config.exempt_role),
            config.timezone,
            config.accounting,
        )
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        reference_day(now, self.timezone)
    }

    /// Admit or reject a request.
    pub async fn check_and_peek(
        &self,
        user_id: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<QuotaTicket, QuotaError> {
        let day = self.today(now);
        let limit = self.policy.daily_limit;

        if self.policy.is_exempt(role) {
            return Ok(QuotaTicket {
                user_id: user_id.to_string(),
                day,
                count: 0,
                charge: Charge::Exempt,
            });
        }

        let (count, charge) = match self.accounting {
            QuotaAccounting::Reference => {
                let record = self.store.get(user_id).await?;
                let count = effective_count(record.as_ref(), day);
                if !self.policy.admits(role, count) {
                    return Err(self.exceeded(user_id, count));
                }
                (count, Charge::Deferred)
            }
            QuotaAccounting::Reserve => match self.store.reserve(user_id, day, limit).await? {
                Reservation::Granted { count_before } => (count_before, Charge::Reserved),
                Reservation::Denied { count } => return Err(self.exceeded(user_id, count)),
            },
        };

        tracing::debug!(user_id = %user_id, count, ceiling = limit, date = %day, "Quota admitted");

        Ok(QuotaTicket {
            user_id: user_id.to_string(),
            day,
            count,
            charge,
        })
    }

    fn exceeded(&self, user_id: &str, count: u32) -> QuotaError {
        tracing::info!(
            user_id = %user_id,
            count,
            ceiling = self.policy.daily_limit,
            "Daily quota exceeded"
        );
        QuotaError::Exceeded {
            count,
            limit: self.policy.daily_limit,
        }
    }

    /// Charge a successful evaluation.
    pub async fn commit(&self, ticket: &QuotaTicket) -> Result<(), StoreError> {
        match ticket.charge {
            Charge::Exempt | Charge::Reserved => Ok(()),
            Charge::Deferred => {
                let record = self
                    .policy
                    .next_record(&ticket.user_id, ticket.day, ticket.count);
                tracing::debug!(user_id = %record.user_id, count = record.count, date = %record.date, "Quota committed");
                self.store.put(record).await
            }
        }
    }

    /// Undo admission for a failed evaluation.
    pub async fn abandon(&self, ticket: &QuotaTicket) -> Result<(), StoreError> {
        match ticket.charge {
            Charge::Reserved => self.store.release(&ticket.user_id, ticket.day).await,
            Charge::Exempt | Charge::Deferred => Ok(()),
        }
    }

    /// Usage for the caller's current reference day.
    pub async fn status(
        &self,
        user_id: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, StoreError> {
        let day = self.today(now);
        let record = self.store.get(user_id).await?;
        let used = effective_count(record.as_ref(), day);
        let exempt = self.policy.is_exempt(role);

        Ok(QuotaStatus {
            used,
            limit: self.policy.daily_limit,
            remaining: if exempt {
                self.policy.daily_limit
            } else {
                self.policy.remaining(used)
            },
            date: day,
            exempt,
        })
    }
}
