//! Book catalog (outlines, World Bibles) and ChapterStore backends.

mod firestore;
mod hybrid;
mod local;
mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::formats::{ChapterRecord, Outline};

pub use firestore::FirestoreLibrary;
pub use hybrid::HybridLibrary;
pub use local::LocalLibrary;
pub use memory::MemoryLibrary;

#[derive(Debug, thiserror::Error)]
pub enum OutlineError {
    #[error("book {0} has no outline")]
    Missing(String),
    #[error("outline of book {slug} is malformed: {reason}")]
    Malformed { slug: String, reason: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Read side of the books the workers generate for.
#[async_trait]
pub trait BookCatalog: Send + Sync {
    /// Book slugs in a stable (sorted) order, including books without an outline.
    async fn list_books(&self) -> anyhow::Result<Vec<String>>;
    async fn load_outline(&self, book: &str) -> Result<Outline, OutlineError>;
    async fn save_outline(&self, book: &str, outline: &Outline) -> anyhow::Result<()>;
    /// The stored World Bible document, verbatim.
    async fn load_world_bible(&self, book: &str) -> anyhow::Result<Option<String>>;
    async fn save_world_bible(&self, book: &str, raw: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ChapterStore: Send + Sync {
    async fn exists(&self, book: &str, chapter: u32) -> anyhow::Result<bool>;
    async fn read(&self, book: &str, chapter: u32) -> anyhow::Result<Option<ChapterRecord>>;
    /// Writes (or replaces) chapter `chapter`. Visible to `exists`/`read` once this returns.
    async fn write(&self, book: &str, chapter: u32, title: &str, content: &str) -> anyhow::Result<()>;
    async fn list_written(&self, book: &str) -> anyhow::Result<BTreeSet<u32>>;
    /// Stores a reworked copy next to the original without touching it; returns its location.
    async fn write_version(&self, book: &str, record: &ChapterRecord) -> anyhow::Result<String>;
}

pub trait Library: BookCatalog + ChapterStore {}

impl<T: BookCatalog + ChapterStore + ?Sized> Library for T {}

/// Millisecond suffix used for reworked chapter versions.
pub(crate) fn version_stamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
