use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{BookCatalog, ChapterStore, OutlineError, version_stamp};
use crate::firestore::{FirestoreClient, value};
use crate::formats::{ChapterRecord, ChapterSpec, Outline};
use crate::text;

/// Books in the `books` collection, chapters in `books/{slug}/chapters/{NN}`.
pub struct FirestoreLibrary {
    client: Arc<FirestoreClient>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookDoc {
    #[serde(default)]
    title: String,
    #[serde(default)]
    genre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    slug: Option<String>,
    #[serde(default)]
    chapters_outline: Option<Vec<ChapterSpec>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterDoc {
    title: String,
    chapter_number: u32,
    content: String,
}

impl FirestoreLibrary {
    pub fn new(client: Arc<FirestoreClient>) -> Self {
        Self { client }
    }

    fn book_path(book: &str) -> String {
        format!("books/{book}")
    }

    fn chapters_path(book: &str) -> String {
        format!("books/{book}/chapters")
    }

    fn chapter_path(book: &str, chapter: u32) -> String {
        format!("{}/{}", Self::chapters_path(book), text::chapter_doc_id(chapter))
    }
}

#[async_trait]
impl BookCatalog for FirestoreLibrary {
    async fn list_books(&self) -> anyhow::Result<Vec<String>> {
        let docs = self
            .client
            .list_documents("books")
            .await
            .context("list cloud books")?;
        let mut books: Vec<String> = docs.iter().map(|doc| doc.id().to_owned()).collect();
        books.sort();
        Ok(books)
    }

    async fn load_outline(&self, book: &str) -> Result<Outline, OutlineError> {
        let Some(doc) = self.client.get_document(&Self::book_path(book)).await? else {
            return Err(OutlineError::Missing(book.to_owned()));
        };
        let book_doc: BookDoc =
            value::from_fields(&doc.fields).map_err(|err| OutlineError::Malformed {
                slug: book.to_owned(),
                reason: format!("{err:#}"),
            })?;
        let Some(chapters) = book_doc.chapters_outline else {
            return Err(OutlineError::Missing(book.to_owned()));
        };
        Ok(Outline {
            title: book_doc.title,
            genre: book_doc.genre,
            chapters,
        })
    }

    async fn save_outline(&self, book: &str, outline: &Outline) -> anyhow::Result<()> {
        let doc = BookDoc {
            title: outline.title.clone(),
            genre: outline.genre.clone(),
            slug: Some(book.to_owned()),
            chapters_outline: Some(outline.chapters.clone()),
        };
        self.client
            .set_document(&Self::book_path(book), value::to_fields(&doc)?, true)
            .await
            .with_context(|| format!("save cloud outline of {book}"))
    }

    async fn load_world_bible(&self, book: &str) -> anyhow::Result<Option<String>> {
        let Some(doc) = self.client.get_document(&Self::book_path(book)).await? else {
            return Ok(None);
        };
        let Some(raw) = doc.fields.get("worldBible") else {
            return Ok(None);
        };
        Ok(match value::decode(raw) {
            serde_json::Value::Null => None,
            serde_json::Value::String(text) => Some(text),
            other => Some(serde_json::to_string_pretty(&other).context("serialize world bible")?),
        })
    }

    async fn save_world_bible(&self, book: &str, raw: &str) -> anyhow::Result<()> {
        let mut fields = value::Fields::new();
        fields.insert(
            "worldBible".to_owned(),
            value::encode(&serde_json::Value::String(raw.to_owned())),
        );
        self.client
            .set_document(&Self::book_path(book), fields, true)
            .await
            .with_context(|| format!("save cloud world bible of {book}"))
    }
}

#[async_trait]
impl ChapterStore for FirestoreLibrary {
    async fn exists(&self, book: &str, chapter: u32) -> anyhow::Result<bool> {
        Ok(self
            .client
            .get_document(&Self::chapter_path(book, chapter))
            .await?
            .is_some())
    }

    async fn read(&self, book: &str, chapter: u32) -> anyhow::Result<Option<ChapterRecord>> {
        let Some(doc) = self
            .client
            .get_document(&Self::chapter_path(book, chapter))
            .await?
        else {
            return Ok(None);
        };
        let chapter_doc: ChapterDoc = value::from_fields(&doc.fields)
            .with_context(|| format!("decode cloud chapter {chapter} of {book}"))?;
        Ok(Some(ChapterRecord {
            chapter,
            title: chapter_doc.title,
            content: chapter_doc.content,
        }))
    }

    async fn write(&self, book: &str, chapter: u32, title: &str, content: &str) -> anyhow::Result<()> {
        let doc = ChapterDoc {
            title: title.to_owned(),
            chapter_number: chapter,
            content: content.to_owned(),
        };
        self.client
            .set_document(&Self::chapter_path(book, chapter), value::to_fields(&doc)?, false)
            .await
            .with_context(|| format!("write cloud chapter {chapter} of {book}"))
    }

    async fn list_written(&self, book: &str) -> anyhow::Result<BTreeSet<u32>> {
        let docs = self
            .client
            .list_documents(&Self::chapters_path(book))
            .await
            .with_context(|| format!("list cloud chapters of {book}"))?;
        Ok(docs
            .iter()
            .filter_map(|doc| {
                doc.fields
                    .get("chapterNumber")
                    .map(value::decode)
                    .and_then(|v| v.as_u64())
                    .and_then(|n| u32::try_from(n).ok())
                    .or_else(|| doc.id().parse().ok())
            })
            .collect())
    }

    async fn write_version(&self, book: &str, record: &ChapterRecord) -> anyhow::Result<String> {
        let path = format!(
            "books/{book}/chapterRevisions/{}_v{}",
            text::chapter_doc_id(record.chapter),
            version_stamp()
        );
        let doc = ChapterDoc {
            title: record.title.clone(),
            chapter_number: record.chapter,
            content: record.content.clone(),
        };
        self.client
            .set_document(&path, value::to_fields(&doc)?, false)
            .await
            .with_context(|| format!("write cloud revision of chapter {} of {book}", record.chapter))?;
        Ok(path)
    }
}
