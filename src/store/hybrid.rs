use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{BookCatalog, ChapterStore, Library, OutlineError};
use crate::formats::{ChapterRecord, Outline};

/// Reads the primary (local) library first and falls back to the secondary (cloud)
/// one; writes go to both.
///
/// A failed secondary call is logged and does not fail the call: the primary
/// copy is authoritative and `sync up` reconciles later.
pub struct HybridLibrary {
    primary: Arc<dyn Library>,
    secondary: Arc<dyn Library>,
}

impl HybridLibrary {
    pub fn new(primary: Arc<dyn Library>, secondary: Arc<dyn Library>) -> Self {
        Self { primary, secondary }
    }

    fn secondary_failed(&self, op: &str, book: &str, err: &anyhow::Error) {
        tracing::warn!(book, op, error = %format!("{err:#}"), "secondary store write failed");
    }

    /// A failed secondary read degrades to the primary answer alone.
    fn secondary_or<T>(&self, book: &str, op: &str, result: anyhow::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(book, op, error = %format!("{err:#}"), "secondary store read failed");
                None
            }
        }
    }
}

#[async_trait]
impl BookCatalog for HybridLibrary {
    async fn list_books(&self) -> anyhow::Result<Vec<String>> {
        let mut books: BTreeSet<String> = self.primary.list_books().await?.into_iter().collect();
        match self.secondary.list_books().await {
            Ok(more) => books.extend(more),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "listing secondary books failed");
            }
        }
        Ok(books.into_iter().collect())
    }

    async fn load_outline(&self, book: &str) -> Result<Outline, OutlineError> {
        match self.primary.load_outline(book).await {
            Ok(outline) => Ok(outline),
            Err(primary_err) => match self.secondary.load_outline(book).await {
                Ok(outline) => Ok(outline),
                Err(OutlineError::Missing(_)) => Err(primary_err),
                Err(err) => {
                    tracing::debug!(book, error = %err, "secondary outline unavailable");
                    Err(primary_err)
                }
            },
        }
    }

    async fn save_outline(&self, book: &str, outline: &Outline) -> anyhow::Result<()> {
        self.primary.save_outline(book, outline).await?;
        if let Err(err) = self.secondary.save_outline(book, outline).await {
            self.secondary_failed("save_outline", book, &err);
        }
        Ok(())
    }

    async fn load_world_bible(&self, book: &str) -> anyhow::Result<Option<String>> {
        if let Some(raw) = self.primary.load_world_bible(book).await? {
            return Ok(Some(raw));
        }
        Ok(self
            .secondary_or(book, "load_world_bible", self.secondary.load_world_bible(book).await)
            .flatten())
    }

    async fn save_world_bible(&self, book: &str, raw: &str) -> anyhow::Result<()> {
        self.primary.save_world_bible(book, raw).await?;
        if let Err(err) = self.secondary.save_world_bible(book, raw).await {
            self.secondary_failed("save_world_bible", book, &err);
        }
        Ok(())
    }
}

#[async_trait]
impl ChapterStore for HybridLibrary {
    async fn exists(&self, book: &str, chapter: u32) -> anyhow::Result<bool> {
        if self.primary.exists(book, chapter).await? {
            return Ok(true);
        }
        Ok(self
            .secondary_or(book, "exists", self.secondary.exists(book, chapter).await)
            .unwrap_or(false))
    }

    async fn read(&self, book: &str, chapter: u32) -> anyhow::Result<Option<ChapterRecord>> {
        if let Some(record) = self.primary.read(book, chapter).await? {
            return Ok(Some(record));
        }
        Ok(self
            .secondary_or(book, "read", self.secondary.read(book, chapter).await)
            .flatten())
    }

    async fn write(&self, book: &str, chapter: u32, title: &str, content: &str) -> anyhow::Result<()> {
        self.primary.write(book, chapter, title, content).await?;
        if let Err(err) = self.secondary.write(book, chapter, title, content).await {
            self.secondary_failed("write", book, &err);
        }
        Ok(())
    }

    async fn list_written(&self, book: &str) -> anyhow::Result<BTreeSet<u32>> {
        let mut written = self.primary.list_written(book).await?;
        if let Some(more) = self.secondary_or(book, "list_written", self.secondary.list_written(book).await) {
            written.extend(more);
        }
        Ok(written)
    }

    async fn write_version(&self, book: &str, record: &ChapterRecord) -> anyhow::Result<String> {
        let location = self.primary.write_version(book, record).await?;
        if let Err(err) = self.secondary.write_version(book, record).await {
            self.secondary_failed("write_version", book, &err);
        }
        Ok(location)
    }
}
