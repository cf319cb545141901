//! Quota arithmetic on reference-timezone calendar days.
//!
//! Days are computed directly from an instant and an IANA timezone, so a
//! quota resets at the same wall-clock midnight wherever the server runs.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::types::Role;

/// Accepted evaluations per user per reference day.
pub const DEFAULT_DAILY_LIMIT: u32 = 3;

/// Timezone whose midnight starts a new quota day.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Berlin;

/// One user's usage on one reference day.
///
/// A single record is kept per user; a record dated before today counts as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub count: u32,
}

/// Calendar day of `now` in `tz`.
pub fn reference_day(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Usage that counts for `today`, given the stored record (if any).
pub fn effective_count(record: Option<&QuotaRecord>, today: NaiveDate) -> u32 {
    match record {
        Some(r) if r.date == today => r.count,
        _ => 0,
    }
}

/// Ceiling and exemption rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub daily_limit: u32,
    pub exempt_role: Role,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            exempt_role: Role::Admin,
        }
    }
}

impl QuotaPolicy {
    pub fn new(daily_limit: u32, exempt_role: Role) -> Self {
        Self {
            daily_limit,
            exempt_role,
        }
    }

    pub fn is_exempt(&self, role: Role) -> bool {
        role == self.exempt_role
    }

    /// Whether a caller with `count` accepted evaluations today may run another.
    pub fn admits(&self, role: Role, count: u32) -> bool {
        self.is_exempt(role) || count < self.daily_limit
    }

    pub fn remaining(&self, count: u32) -> u32 {
        self.daily_limit.saturating_sub(count)
    }

    /// The record written after a successful evaluation.
    ///
    /// Replaces any stale prior-day record.
    pub fn next_record(&self, user_id: &str, today: NaiveDate, effective: u32) -> QuotaRecord {
        QuotaRecord {
            user_id: user_id.to_string(),
            date: today,
            count: effective.saturating_add(1),
        }
    }
}
