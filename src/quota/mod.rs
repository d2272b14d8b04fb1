//! QuotaStore: the per-book daily claim counter shared by every worker.

mod firestore;
mod local;
mod memory;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Days, NaiveDate};

use crate::formats::QuotaRecord;

pub use firestore::FirestoreQuotaStore;
pub use local::LocalQuotaStore;
pub use memory::MemoryQuotaStore;

/// Source of "today" for daily quota windows.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// UTC calendar day.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Utc::now().date_naive()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        *self.today.lock().unwrap_or_else(|e| e.into_inner()) = today;
    }

    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap_or_else(|e| e.into_inner());
        *today = today.checked_add_days(Days::new(days)).unwrap_or(*today);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The claim rule, shared by every backend.
#[derive(Clone)]
pub struct QuotaPolicy {
    max_per_day: u32,
    clock: Arc<dyn Clock>,
}

impl QuotaPolicy {
    pub fn new(max_per_day: u32, clock: Arc<dyn Clock>) -> Self {
        Self { max_per_day, clock }
    }

    pub fn max_per_day(&self) -> u32 {
        self.max_per_day
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// The record to store if a claim against `current` is granted, or `None` if denied.
    ///
    /// A record from another day is replaced by `{today, 1}`.
    pub fn evaluate(&self, current: Option<&QuotaRecord>) -> Option<QuotaRecord> {
        let today = self.today();
        match current {
            Some(record) if record.date == today => {
                (record.count < self.max_per_day).then_some(QuotaRecord {
                    date: today,
                    count: record.count + 1,
                })
            }
            _ => (self.max_per_day > 0).then_some(QuotaRecord {
                date: today,
                count: 1,
            }),
        }
    }
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Atomically reserves one of today's slots for `book`.
    async fn claim(&self, book: &str) -> anyhow::Result<bool>;

    /// Advisory, non-mutating version of [`QuotaStore::claim`]. Racy by nature.
    async fn can_claim(&self, book: &str) -> anyhow::Result<bool>;

    async fn record(&self, book: &str) -> anyhow::Result<Option<QuotaRecord>>;
}

#[cfg(test)]
pub(crate) fn test_policy(max_per_day: u32) -> (QuotaPolicy, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(day(2026, 1, 1)));
    (QuotaPolicy::new(max_per_day, clock.clone()), clock)
}

#[cfg(test)]
pub(crate) fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_claim_starts_the_day_at_one() {
        let (policy, _) = test_policy(3);
        assert_eq!(
            policy.evaluate(None),
            Some(QuotaRecord {
                date: day(2026, 1, 1),
                count: 1
            })
        );
    }

    #[test]
    fn claims_are_denied_at_the_cap() {
        let (policy, _) = test_policy(2);
        let at_cap = QuotaRecord {
            date: day(2026, 1, 1),
            count: 2,
        };
        assert_eq!(policy.evaluate(Some(&at_cap)), None);
        let below = QuotaRecord { count: 1, ..at_cap };
        assert_eq!(policy.evaluate(Some(&below)).map(|r| r.count), Some(2));
    }

    #[test]
    fn stale_record_resets_even_at_cap() {
        let (policy, clock) = test_policy(2);
        let yesterday = QuotaRecord {
            date: day(2026, 1, 1),
            count: 2,
        };
        clock.advance_days(1);
        assert_eq!(
            policy.evaluate(Some(&yesterday)),
            Some(QuotaRecord {
                date: day(2026, 1, 2),
                count: 1
            })
        );
    }
}
