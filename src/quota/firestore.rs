use std::sync::Arc;

use async_trait::async_trait;

use super::{QuotaPolicy, QuotaStore};
use crate::firestore::{CommitOutcome, FirestoreClient, value};
use crate::formats::QuotaRecord;

const COLLECTION: &str = "generationStates";
const MAX_ATTEMPTS: u32 = 5;

/// Quota records in `generationStates/{book}`, claimed inside a read-write transaction.
pub struct FirestoreQuotaStore {
    client: Arc<FirestoreClient>,
    policy: QuotaPolicy,
}

impl FirestoreQuotaStore {
    pub fn new(client: Arc<FirestoreClient>, policy: QuotaPolicy) -> Self {
        Self { client, policy }
    }

    fn path(book: &str) -> String {
        format!("{COLLECTION}/{book}")
    }

    async fn try_claim(&self, book: &str) -> anyhow::Result<Option<bool>> {
        let path = Self::path(book);
        let tx = self.client.begin_transaction().await?;

        let current = match self.client.get_document_in(&path, &tx).await {
            Ok(doc) => doc.and_then(|doc| decode_record(book, &doc.fields)),
            Err(err) => {
                self.rollback(&tx).await;
                return Err(err);
            }
        };

        let Some(next) = self.policy.evaluate(current.as_ref()) else {
            self.rollback(&tx).await;
            tracing::debug!(book, "quota claim denied");
            return Ok(Some(false));
        };

        let fields = value::to_fields(&next)?;
        match self.client.commit(&tx, vec![(path, fields)]).await? {
            CommitOutcome::Committed => {
                tracing::debug!(book, count = next.count, "quota claim granted");
                Ok(Some(true))
            }
            CommitOutcome::Aborted => Ok(None),
        }
    }

    async fn rollback(&self, tx: &str) {
        if let Err(err) = self.client.rollback(tx).await {
            tracing::debug!(error = %format!("{err:#}"), "rollback failed");
        }
    }
}

/// Records that do not decode (hand edits, old formats) are treated as stale.
fn decode_record(book: &str, fields: &crate::firestore::Fields) -> Option<QuotaRecord> {
    match value::from_fields::<QuotaRecord>(fields) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::warn!(book, error = %format!("{err:#}"), "ignoring unreadable quota record");
            None
        }
    }
}

#[async_trait]
impl QuotaStore for FirestoreQuotaStore {
    async fn claim(&self, book: &str) -> anyhow::Result<bool> {
        for attempt in 1..=MAX_ATTEMPTS {
            if let Some(granted) = self.try_claim(book).await? {
                return Ok(granted);
            }
            tracing::debug!(book, attempt, "quota transaction aborted, retrying");
        }
        tracing::warn!(
            book,
            attempts = MAX_ATTEMPTS,
            "quota transaction kept aborting; treating claim as denied"
        );
        Ok(false)
    }

    async fn can_claim(&self, book: &str) -> anyhow::Result<bool> {
        Ok(self.policy.evaluate(self.record(book).await?.as_ref()).is_some())
    }

    async fn record(&self, book: &str) -> anyhow::Result<Option<QuotaRecord>> {
        let doc = self.client.get_document(&Self::path(book)).await?;
        Ok(doc.and_then(|doc| decode_record(book, &doc.fields)))
    }
}
