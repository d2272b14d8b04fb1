use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BookCatalog, ChapterStore, OutlineError};
use crate::formats::{ChapterRecord, Outline};

#[derive(Debug, Default)]
struct MemoryBook {
    outline: Option<Outline>,
    world_bible: Option<String>,
    chapters: BTreeMap<u32, ChapterRecord>,
    versions: Vec<ChapterRecord>,
}

/// In-process library for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLibrary {
    books: Mutex<BTreeMap<String, MemoryBook>>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a book directory with no outline.
    pub async fn add_empty_book(&self, book: &str) {
        self.books.lock().await.entry(book.to_owned()).or_default();
    }

    pub async fn versions(&self, book: &str) -> Vec<ChapterRecord> {
        self.books
            .lock()
            .await
            .get(book)
            .map(|b| b.versions.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BookCatalog for MemoryLibrary {
    async fn list_books(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.books.lock().await.keys().cloned().collect())
    }

    async fn load_outline(&self, book: &str) -> Result<Outline, OutlineError> {
        self.books
            .lock()
            .await
            .get(book)
            .and_then(|b| b.outline.clone())
            .ok_or_else(|| OutlineError::Missing(book.to_owned()))
    }

    async fn save_outline(&self, book: &str, outline: &Outline) -> anyhow::Result<()> {
        self.books
            .lock()
            .await
            .entry(book.to_owned())
            .or_default()
            .outline = Some(outline.clone());
        Ok(())
    }

    async fn load_world_bible(&self, book: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .books
            .lock()
            .await
            .get(book)
            .and_then(|b| b.world_bible.clone()))
    }

    async fn save_world_bible(&self, book: &str, raw: &str) -> anyhow::Result<()> {
        self.books
            .lock()
            .await
            .entry(book.to_owned())
            .or_default()
            .world_bible = Some(raw.to_owned());
        Ok(())
    }
}

#[async_trait]
impl ChapterStore for MemoryLibrary {
    async fn exists(&self, book: &str, chapter: u32) -> anyhow::Result<bool> {
        Ok(self
            .books
            .lock()
            .await
            .get(book)
            .is_some_and(|b| b.chapters.contains_key(&chapter)))
    }

    async fn read(&self, book: &str, chapter: u32) -> anyhow::Result<Option<ChapterRecord>> {
        Ok(self
            .books
            .lock()
            .await
            .get(book)
            .and_then(|b| b.chapters.get(&chapter).cloned()))
    }

    async fn write(&self, book: &str, chapter: u32, title: &str, content: &str) -> anyhow::Result<()> {
        self.books
            .lock()
            .await
            .entry(book.to_owned())
            .or_default()
            .chapters
            .insert(
                chapter,
                ChapterRecord {
                    chapter,
                    title: title.to_owned(),
                    content: content.to_owned(),
                },
            );
        Ok(())
    }

    async fn list_written(&self, book: &str) -> anyhow::Result<BTreeSet<u32>> {
        Ok(self
            .books
            .lock()
            .await
            .get(book)
            .map(|b| b.chapters.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn write_version(&self, book: &str, record: &ChapterRecord) -> anyhow::Result<String> {
        let mut books = self.books.lock().await;
        let entry = books.entry(book.to_owned()).or_default();
        entry.versions.push(record.clone());
        Ok(format!("memory://{book}/{:02}/v{}", record.chapter, entry.versions.len()))
    }
}
