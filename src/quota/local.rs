use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use fs2::FileExt as _;

use super::{QuotaPolicy, QuotaStore};
use crate::formats::QuotaRecord;

type QuotaFile = BTreeMap<String, QuotaRecord>;

/// Quota records in `<books_dir>/.quota.json`.
///
/// Every read-modify-write holds an exclusive lock on `.quota.lock`, so workers
/// in other processes sharing the directory are serialized too.
#[derive(Clone)]
pub struct LocalQuotaStore {
    books_dir: PathBuf,
    policy: QuotaPolicy,
}

impl LocalQuotaStore {
    pub fn new(books_dir: impl Into<PathBuf>, policy: QuotaPolicy) -> Self {
        Self {
            books_dir: books_dir.into(),
            policy,
        }
    }

    fn quota_path(&self) -> PathBuf {
        self.books_dir.join(".quota.json")
    }

    fn lock_path(&self) -> PathBuf {
        self.books_dir.join(".quota.lock")
    }

    /// Runs `f` on the decoded quota file under the exclusive lock. The file is
    /// written back when `f` reports a change.
    async fn with_locked_file<R, F>(&self, f: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut QuotaFile) -> (R, bool) + Send + 'static,
    {
        let quota_path = self.quota_path();
        let lock_path = self.lock_path();
        tokio::task::spawn_blocking(move || -> anyhow::Result<R> {
            if let Some(parent) = lock_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create books dir: {}", parent.display()))?;
            }
            let lock = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)
                .with_context(|| format!("open quota lock {}", lock_path.display()))?;
            lock.lock_exclusive()
                .with_context(|| format!("acquire quota lock {}", lock_path.display()))?;

            let result = (|| -> anyhow::Result<R> {
                let mut file = read_quota_file(&quota_path)?;
                let (value, dirty) = f(&mut file);
                if dirty {
                    write_quota_file(&quota_path, &file)?;
                }
                Ok(value)
            })();

            // Closing the handle releases the lock.
            drop(lock);
            result
        })
        .await
        .context("join quota lock task")?
    }
}

fn read_quota_file(path: &Path) -> anyhow::Result<QuotaFile> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(QuotaFile::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("read: {}", path.display()));
        }
    };
    // An unreadable file or record counts as stale; the next claim rewrites it.
    let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_slice(&bytes) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "quota file is unreadable; starting fresh");
            return Ok(QuotaFile::new());
        }
    };
    Ok(raw
        .into_iter()
        .filter_map(|(book, value)| match serde_json::from_value::<QuotaRecord>(value) {
            Ok(record) => Some((book, record)),
            Err(err) => {
                tracing::warn!(book = %book, error = %err, "dropping unreadable quota record");
                None
            }
        })
        .collect())
}

fn write_quota_file(path: &Path, file: &QuotaFile) -> anyhow::Result<()> {
    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(file).context("serialize json")?;
    fs::write(&tmp_path, &data).with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl QuotaStore for LocalQuotaStore {
    async fn claim(&self, book: &str) -> anyhow::Result<bool> {
        let policy = self.policy.clone();
        let key = book.to_owned();
        let granted = self
            .with_locked_file(move |file| match policy.evaluate(file.get(&key)) {
                Some(next) => {
                    file.insert(key, next);
                    (Some(next), true)
                }
                None => (None, false),
            })
            .await
            .with_context(|| format!("claim quota for {book}"))?;

        match granted {
            Some(record) => {
                tracing::debug!(book, count = record.count, "quota claim granted");
                Ok(true)
            }
            None => {
                tracing::debug!(book, "quota claim denied");
                Ok(false)
            }
        }
    }

    async fn can_claim(&self, book: &str) -> anyhow::Result<bool> {
        Ok(self.policy.evaluate(self.record(book).await?.as_ref()).is_some())
    }

    async fn record(&self, book: &str) -> anyhow::Result<Option<QuotaRecord>> {
        let key = book.to_owned();
        self.with_locked_file(move |file| (file.get(&key).copied(), false))
            .await
            .with_context(|| format!("read quota for {book}"))
    }
}
