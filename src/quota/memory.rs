use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{QuotaPolicy, QuotaStore};
use crate::formats::QuotaRecord;

/// In-process quota store; atomic within one process only.
pub struct MemoryQuotaStore {
    policy: QuotaPolicy,
    records: Mutex<HashMap<String, QuotaRecord>>,
}

impl MemoryQuotaStore {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self {
            policy,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, book: &str, record: QuotaRecord) {
        self.records.lock().await.insert(book.to_owned(), record);
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn claim(&self, book: &str) -> anyhow::Result<bool> {
        let mut records = self.records.lock().await;
        match self.policy.evaluate(records.get(book)) {
            Some(next) => {
                records.insert(book.to_owned(), next);
                tracing::debug!(book, count = next.count, "quota claim granted");
                Ok(true)
            }
            None => {
                tracing::debug!(book, "quota claim denied");
                Ok(false)
            }
        }
    }

    async fn can_claim(&self, book: &str) -> anyhow::Result<bool> {
        let records = self.records.lock().await;
        Ok(self.policy.evaluate(records.get(book)).is_some())
    }

    async fn record(&self, book: &str) -> anyhow::Result<Option<QuotaRecord>> {
        Ok(self.records.lock().await.get(book).copied())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::quota::{day, test_policy};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_never_exceed_the_cap() {
        let (policy, _) = test_policy(3);
        let store = Arc::new(MemoryQuotaStore::new(policy));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.claim("demo").await }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 3);
        assert_eq!(store.record("demo").await.unwrap().unwrap().count, 3);
    }

    #[tokio::test]
    async fn yesterdays_full_record_grants_and_resets() {
        let (policy, clock) = test_policy(2);
        let store = MemoryQuotaStore::new(policy);
        store
            .insert("demo", QuotaRecord { date: day(2026, 1, 1), count: 2 })
            .await;
        assert!(!store.can_claim("demo").await.unwrap());

        clock.advance_days(1);
        assert!(store.can_claim("demo").await.unwrap());
        assert!(store.claim("demo").await.unwrap());
        assert_eq!(
            store.record("demo").await.unwrap(),
            Some(QuotaRecord { date: day(2026, 1, 2), count: 1 })
        );
    }

    #[tokio::test]
    async fn can_claim_does_not_consume_a_slot() {
        let (policy, _) = test_policy(1);
        let store = MemoryQuotaStore::new(policy);
        assert!(store.can_claim("demo").await.unwrap());
        assert!(store.can_claim("demo").await.unwrap());
        assert_eq!(store.record("demo").await.unwrap(), None);
        assert!(store.claim("demo").await.unwrap());
        assert!(!store.claim("demo").await.unwrap());
    }
}
