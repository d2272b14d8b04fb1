use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;

use super::{BookCatalog, ChapterStore, OutlineError, version_stamp};
use crate::formats::{ChapterRecord, Outline};
use crate::text;

/// Books as directories under `books_dir`:
///
/// ```text
/// <books_dir>/<slug>/outline.json
/// <books_dir>/<slug>/world.json
/// <books_dir>/<slug>/NN-<chapter-slug>.md
/// ```
#[derive(Debug, Clone)]
pub struct LocalLibrary {
    books_dir: PathBuf,
}

impl LocalLibrary {
    pub fn new(books_dir: impl Into<PathBuf>) -> Self {
        Self {
            books_dir: books_dir.into(),
        }
    }

    pub fn books_dir(&self) -> &Path {
        &self.books_dir
    }

    pub fn book_dir(&self, book: &str) -> PathBuf {
        self.books_dir.join(book)
    }

    fn outline_path(&self, book: &str) -> PathBuf {
        self.book_dir(book).join("outline.json")
    }

    fn world_path(&self, book: &str) -> PathBuf {
        self.book_dir(book).join("world.json")
    }

    /// Chapter files of `book` as (chapter number, path), sorted by file name.
    async fn chapter_files(&self, book: &str) -> anyhow::Result<Vec<(u32, PathBuf)>> {
        let dir = self.book_dir(book);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read book dir: {}", dir.display()));
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("read book dir: {}", dir.display()))?
        {
            let name = entry.file_name();
            let Some(number) = name.to_str().and_then(text::chapter_number_from_file_name) else {
                continue;
            };
            files.push((number, entry.path()));
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }

    async fn chapter_path(&self, book: &str, chapter: u32) -> anyhow::Result<Option<PathBuf>> {
        Ok(self
            .chapter_files(book)
            .await?
            .into_iter()
            .find(|(number, _)| *number == chapter)
            .map(|(_, path)| path))
    }
}

#[async_trait]
impl BookCatalog for LocalLibrary {
    async fn list_books(&self) -> anyhow::Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.books_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read books dir: {}", self.books_dir.display()));
            }
        };

        let mut books = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("read books dir: {}", self.books_dir.display()))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                books.push(name);
            }
        }
        books.sort();
        Ok(books)
    }

    async fn load_outline(&self, book: &str) -> Result<Outline, OutlineError> {
        let path = self.outline_path(book);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(OutlineError::Missing(book.to_owned()));
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("read: {}", path.display()))
                    .into());
            }
        };
        serde_json::from_slice(&bytes).map_err(|err| OutlineError::Malformed {
            slug: book.to_owned(),
            reason: err.to_string(),
        })
    }

    async fn save_outline(&self, book: &str, outline: &Outline) -> anyhow::Result<()> {
        write_json_atomic(&self.outline_path(book), outline)
            .await
            .context("write outline.json")
    }

    async fn load_world_bible(&self, book: &str) -> anyhow::Result<Option<String>> {
        let path = self.world_path(book);
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read: {}", path.display())),
        }
    }

    async fn save_world_bible(&self, book: &str, raw: &str) -> anyhow::Result<()> {
        write_text_atomic(&self.world_path(book), raw)
            .await
            .context("write world.json")
    }
}

#[async_trait]
impl ChapterStore for LocalLibrary {
    async fn exists(&self, book: &str, chapter: u32) -> anyhow::Result<bool> {
        Ok(self.chapter_path(book, chapter).await?.is_some())
    }

    async fn read(&self, book: &str, chapter: u32) -> anyhow::Result<Option<ChapterRecord>> {
        let Some(path) = self.chapter_path(book, chapter).await? else {
            return Ok(None);
        };
        let markdown = fs::read_to_string(&path)
            .await
            .with_context(|| format!("read chapter: {}", path.display()))?;

        let (heading, body) = text::split_heading(&markdown);
        let title = heading.unwrap_or_else(|| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let slug = stem.split_once('-').map(|(_, rest)| rest).unwrap_or_default();
            text::title_from_slug(slug)
        });
        Ok(Some(ChapterRecord {
            chapter,
            title,
            content: body.to_owned(),
        }))
    }

    async fn write(&self, book: &str, chapter: u32, title: &str, content: &str) -> anyhow::Result<()> {
        let path = self.book_dir(book).join(text::chapter_file_name(chapter, title));
        write_text_atomic(&path, &text::with_heading(chapter, title, content))
            .await
            .with_context(|| format!("write chapter {chapter} of {book}"))?;

        // A retitled chapter must not leave its old file behind.
        for (number, stale) in self.chapter_files(book).await? {
            if number == chapter && stale != path {
                fs::remove_file(&stale)
                    .await
                    .with_context(|| format!("remove stale chapter file: {}", stale.display()))?;
            }
        }
        Ok(())
    }

    async fn list_written(&self, book: &str) -> anyhow::Result<BTreeSet<u32>> {
        Ok(self
            .chapter_files(book)
            .await?
            .into_iter()
            .map(|(number, _)| number)
            .collect())
    }

    async fn write_version(&self, book: &str, record: &ChapterRecord) -> anyhow::Result<String> {
        let name = format!(
            "{}_v{}.md",
            text::chapter_file_stem(record.chapter, &record.title),
            version_stamp()
        );
        let path = self.book_dir(book).join(name);
        write_text_atomic(
            &path,
            &text::with_heading(record.chapter, &record.title, &record.content),
        )
        .await
        .with_context(|| format!("write reworked chapter {} of {book}", record.chapter))?;
        Ok(path.display().to_string())
    }
}

pub(crate) async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    write_atomic(path, &data).await
}

pub(crate) async fn write_text_atomic(path: &Path, text: &str) -> anyhow::Result<()> {
    write_atomic(path, text.as_bytes()).await
}

async fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp_path, data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::testing::outline;

    #[tokio::test]
    async fn chapter_round_trip_uses_numbered_markdown_files() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let library = LocalLibrary::new(dir.path());

        library.write("demo", 2, "The Storm", "Rain fell.\n").await?;

        let raw = std::fs::read_to_string(dir.path().join("demo/02-the-storm.md"))?;
        assert_eq!(raw, "# Chapter 2: The Storm\n\nRain fell.\n");
        assert!(library.exists("demo", 2).await?);
        assert!(!library.exists("demo", 1).await?);

        let record = library.read("demo", 2).await?.unwrap();
        assert_eq!(record.title, "The Storm");
        assert_eq!(record.content, "Rain fell.\n");
        Ok(())
    }

    #[tokio::test]
    async fn list_written_ignores_versions_and_other_files() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let library = LocalLibrary::new(dir.path());
        library.save_outline("demo", &outline(3)).await?;
        library.write("demo", 1, "One", "a").await?;
        library.write("demo", 3, "Three", "c").await?;
        let version = library
            .write_version(
                "demo",
                &ChapterRecord {
                    chapter: 2,
                    title: "Two".to_owned(),
                    content: "b".to_owned(),
                },
            )
            .await?;
        assert!(version.contains("02-two_v"));
        std::fs::write(dir.path().join("demo/notes.md"), "scratch")?;

        let written = library.list_written("demo").await?;
        assert_eq!(written, BTreeSet::from([1, 3]));
        Ok(())
    }

    #[tokio::test]
    async fn titles_that_look_versioned_still_count_as_written() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let library = LocalLibrary::new(dir.path());
        library.save_outline("demo", &outline(2)).await?;
        library.write("demo", 1, "Plan_v2", "plans").await?;

        assert!(dir.path().join("demo/01-plan-v2.md").exists());
        assert!(library.exists("demo", 1).await?);
        assert_eq!(library.list_written("demo").await?, BTreeSet::from([1]));
        Ok(())
    }

    #[tokio::test]
    async fn rewriting_with_new_title_replaces_old_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let library = LocalLibrary::new(dir.path());
        library.write("demo", 1, "Old", "a").await?;
        library.write("demo", 1, "New", "b").await?;

        assert!(!dir.path().join("demo/01-old.md").exists());
        assert_eq!(library.read("demo", 1).await?.unwrap().content, "b");
        Ok(())
    }

    #[tokio::test]
    async fn outline_errors_are_classified() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let library = LocalLibrary::new(dir.path());
        std::fs::create_dir_all(dir.path().join("empty"))?;
        std::fs::create_dir_all(dir.path().join("broken"))?;
        std::fs::write(dir.path().join("broken/outline.json"), "{ not json")?;

        assert!(matches!(
            library.load_outline("empty").await,
            Err(OutlineError::Missing(slug)) if slug == "empty"
        ));
        assert!(matches!(
            library.load_outline("broken").await,
            Err(OutlineError::Malformed { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn list_books_is_sorted_and_skips_hidden_entries() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let library = LocalLibrary::new(dir.path());
        for name in ["zeta", "alpha", ".cache"] {
            std::fs::create_dir_all(dir.path().join(name))?;
        }
        std::fs::write(dir.path().join(".quota.json"), "{}")?;

        assert_eq!(library.list_books().await?, vec!["alpha", "zeta"]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_books_dir_is_an_empty_catalog() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let library = LocalLibrary::new(dir.path().join("nope"));
        assert!(library.list_books().await?.is_empty());
        assert!(library.list_written("demo").await?.is_empty());
        assert_eq!(library.load_world_bible("demo").await?, None);
        Ok(())
    }
}
