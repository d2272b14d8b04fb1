//! Best-effort copies between the local and the cloud library.

use anyhow::Context as _;
use serde::Serialize;

use crate::store::{Library, OutlineError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub books: usize,
    pub outlines: usize,
    pub chapters: usize,
    pub failed_books: Vec<String>,
}

/// Pushes every local book to the cloud. Cloud copies are overwritten.
pub async fn sync_up(local: &dyn Library, cloud: &dyn Library) -> anyhow::Result<SyncReport> {
    let mut report = SyncReport::default();
    for book in local.list_books().await.context("list local books")? {
        match push_book(local, cloud, &book, &mut report).await {
            Ok(true) => report.books += 1,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(book = %book, error = %format!("{err:#}"), "sync up failed for book");
                report.failed_books.push(book);
            }
        }
    }
    tracing::info!(books = report.books, chapters = report.chapters, failed = report.failed_books.len(), "sync up finished");
    Ok(report)
}

async fn push_book(local: &dyn Library, cloud: &dyn Library, book: &str, report: &mut SyncReport) -> anyhow::Result<bool> {
    let outline = match local.load_outline(book).await {
        Ok(outline) => outline,
        Err(OutlineError::Missing(_)) => {
            tracing::debug!(book, "skipping local book without outline");
            return Ok(false);
        }
        Err(err) => return Err(err.into()),
    };
    cloud.save_outline(book, &outline).await?;
    report.outlines += 1;

    if let Some(world) = local.load_world_bible(book).await? {
        cloud.save_world_bible(book, &world).await?;
    }

    for chapter in local.list_written(book).await? {
        let Some(record) = local.read(book, chapter).await? else {
            continue;
        };
        cloud
            .write(book, chapter, &record.title, &record.content)
            .await?;
        report.chapters += 1;
    }
    Ok(true)
}

/// Pulls cloud books that are missing locally. Existing local files are never touched.
pub async fn sync_down(cloud: &dyn Library, local: &dyn Library) -> anyhow::Result<SyncReport> {
    let mut report = SyncReport::default();
    for book in cloud.list_books().await.context("list cloud books")? {
        match pull_book(cloud, local, &book, &mut report).await {
            Ok(()) => report.books += 1,
            Err(err) => {
                tracing::warn!(book = %book, error = %format!("{err:#}"), "sync down failed for book");
                report.failed_books.push(book);
            }
        }
    }
    tracing::info!(books = report.books, chapters = report.chapters, failed = report.failed_books.len(), "sync down finished");
    Ok(report)
}

async fn pull_book(cloud: &dyn Library, local: &dyn Library, book: &str, report: &mut SyncReport) -> anyhow::Result<()> {
    match local.load_outline(book).await {
        Ok(_) => {}
        Err(OutlineError::Missing(_)) => match cloud.load_outline(book).await {
            Ok(outline) => {
                local.save_outline(book, &outline).await?;
                report.outlines += 1;
            }
            Err(OutlineError::Missing(_)) => {}
            Err(err) => return Err(err.into()),
        },
        Err(err) => return Err(err.into()),
    }

    if local.load_world_bible(book).await?.is_none()
        && let Some(world) = cloud.load_world_bible(book).await?
    {
        local.save_world_bible(book, &world).await?;
    }

    let present = local.list_written(book).await?;
    for chapter in cloud.list_written(book).await? {
        if present.contains(&chapter) {
            continue;
        }
        let Some(record) = cloud.read(book, chapter).await? else {
            continue;
        };
        local
            .write(book, chapter, &record.title, &record.content)
            .await?;
        report.chapters += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::store::{BookCatalog, ChapterStore, MemoryLibrary};
    use crate::testing::outline;

    #[tokio::test]
    async fn sync_up_overwrites_cloud_chapters() -> anyhow::Result<()> {
        let local = MemoryLibrary::new();
        let cloud = MemoryLibrary::new();
        local.save_outline("demo", &outline(2)).await?;
        local.save_world_bible("demo", "{}").await?;
        local.write("demo", 1, "One", "local").await?;
        cloud.write("demo", 1, "One", "stale").await?;
        local.add_empty_book("draft").await;

        let report = sync_up(&local, &cloud).await?;
        assert_eq!(report.books, 1);
        assert_eq!(report.chapters, 1);
        assert_eq!(cloud.read("demo", 1).await?.unwrap().content, "local");
        assert_eq!(cloud.load_world_bible("demo").await?.as_deref(), Some("{}"));
        assert!(cloud.list_books().await?.contains(&"demo".to_owned()));
        Ok(())
    }

    #[tokio::test]
    async fn sync_down_only_creates_missing_files() -> anyhow::Result<()> {
        let local = MemoryLibrary::new();
        let cloud = MemoryLibrary::new();
        cloud.save_outline("demo", &outline(3)).await?;
        cloud.write("demo", 1, "One", "cloud one").await?;
        cloud.write("demo", 2, "Two", "cloud two").await?;
        local.write("demo", 1, "One", "local one").await?;

        let report = sync_down(&cloud, &local).await?;
        assert_eq!(report.outlines, 1);
        assert_eq!(report.chapters, 1);
        assert_eq!(local.read("demo", 1).await?.unwrap().content, "local one");
        assert_eq!(local.read("demo", 2).await?.unwrap().content, "cloud two");
        assert_eq!(local.list_written("demo").await?, BTreeSet::from([1, 2]));

        let again = sync_down(&cloud, &local).await?;
        assert_eq!((again.outlines, again.chapters), (0, 0));
        Ok(())
    }
}
