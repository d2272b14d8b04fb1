//! BacklogScanner: find the next chapter that still has to be written.

use std::sync::Arc;

use crate::formats::Task;
use crate::quota::QuotaStore;
use crate::store::{BookCatalog, ChapterStore, Library, OutlineError};

/// Result of a claim-integrated scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A task whose quota slot has already been reserved.
    Claimed(Task),
    /// Work exists, but every book that has some was denied a claim.
    Denied { books: Vec<String> },
    Exhausted,
}

/// Read-only: scanning twice without an intervening write yields the same task.
pub struct BacklogScanner {
    catalog: Arc<dyn BookCatalog>,
    chapters: Arc<dyn ChapterStore>,
}

impl BacklogScanner {
    pub fn new(catalog: Arc<dyn BookCatalog>, chapters: Arc<dyn ChapterStore>) -> Self {
        Self { catalog, chapters }
    }

    pub fn over(library: Arc<dyn Library>) -> Self {
        Self::new(library.clone(), library)
    }

    /// The lowest unwritten chapter of `book`, or `None` when the book is complete
    /// or cannot be scanned (no outline, unreadable store).
    pub async fn next_task_for(&self, book: &str) -> Option<Task> {
        let outline = match self.catalog.load_outline(book).await {
            Ok(outline) => outline,
            Err(OutlineError::Missing(_)) => {
                tracing::debug!(book, "skipping book without outline");
                return None;
            }
            Err(err) => {
                tracing::warn!(book, error = %format!("{err:#}"), "skipping book with unreadable outline");
                return None;
            }
        };

        let written = match self.chapters.list_written(book).await {
            Ok(written) => written,
            Err(err) => {
                tracing::warn!(book, error = %format!("{err:#}"), "skipping book: listing chapters failed");
                return None;
            }
        };

        Task::next_missing(book, &outline, &written)
    }

    /// First missing chapter across all books, in book order.
    pub async fn find_next_task(&self) -> anyhow::Result<Option<Task>> {
        for book in self.catalog.list_books().await? {
            if let Some(task) = self.next_task_for(&book).await {
                tracing::debug!(book = %task.book, chapter = task.chapter.chapter, "found task");
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    /// Like [`Self::find_next_task`], but claims each book's candidate as it goes.
    ///
    /// A denied book is abandoned for the rest of this pass; scanning moves on to
    /// the next book instead of trying its later chapters.
    pub async fn find_next_claimed_task(&self, quota: &dyn QuotaStore) -> anyhow::Result<ScanOutcome> {
        let mut denied = Vec::new();
        for book in self.catalog.list_books().await? {
            let Some(task) = self.next_task_for(&book).await else {
                continue;
            };
            let granted = match quota.claim(&book).await {
                Ok(granted) => granted,
                Err(err) => {
                    tracing::warn!(book = %book, error = %format!("{err:#}"), "quota claim failed; treating as denied");
                    false
                }
            };
            if granted {
                tracing::info!(book = %book, chapter = task.chapter.chapter, "claimed task");
                return Ok(ScanOutcome::Claimed(task));
            }
            tracing::info!(book = %book, chapter = task.chapter.chapter, "daily quota reached, trying next book");
            denied.push(book);
        }

        if denied.is_empty() {
            Ok(ScanOutcome::Exhausted)
        } else {
            Ok(ScanOutcome::Denied { books: denied })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::quota::{MemoryQuotaStore, test_policy};
    use crate::store::MemoryLibrary;
    use crate::testing::outline;

    async fn library_with(books: &[(&str, u32, Vec<u32>)]) -> Arc<MemoryLibrary> {
        let library = Arc::new(MemoryLibrary::new());
        for (book, chapters, written) in books {
            library.save_outline(book, &outline(*chapters)).await.unwrap();
            for n in written {
                library.write(book, *n, "t", "text").await.unwrap();
            }
        }
        library
    }

    #[tokio::test]
    async fn returns_smallest_missing_chapter_for_every_subset() {
        let all: Vec<u32> = (1..=4).collect();
        for mask in 0u32..16 {
            let written: Vec<u32> = all.iter().copied().filter(|n| mask & (1 << (n - 1)) != 0).collect();
            let library = library_with(&[("demo", 4, written.clone())]).await;
            let scanner = BacklogScanner::over(library);

            let task = scanner.find_next_task().await.unwrap();
            let expected = all.iter().copied().find(|n| !written.contains(n));
            assert_eq!(task.map(|t| t.chapter.chapter), expected, "written = {written:?}");
        }
    }

    #[tokio::test]
    async fn previous_summary_comes_from_outline_even_if_unwritten() {
        let library = library_with(&[("demo", 3, vec![1, 3])]).await;
        let task = BacklogScanner::over(library).find_next_task().await.unwrap().unwrap();
        assert_eq!(task.chapter.chapter, 2);
        assert_eq!(task.previous_summary.as_deref(), Some("summary 1"));

        let library = library_with(&[("demo", 3, vec![2])]).await;
        let task = BacklogScanner::over(library).find_next_task().await.unwrap().unwrap();
        assert_eq!(task.chapter.chapter, 1);
        assert_eq!(task.previous_summary, None);
    }

    #[tokio::test]
    async fn books_without_outline_are_skipped() {
        let library = library_with(&[("b-book", 2, vec![])]).await;
        library.add_empty_book("a-book").await;
        let task = BacklogScanner::over(library).find_next_task().await.unwrap().unwrap();
        assert_eq!(task.book, "b-book");
    }

    #[tokio::test]
    async fn rescanning_without_writes_is_stable() {
        let library = library_with(&[("a", 2, vec![1, 2]), ("b", 3, vec![1])]).await;
        let scanner = BacklogScanner::over(library);
        let first = scanner.find_next_task().await.unwrap();
        let second = scanner.find_next_task().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.map(|t| (t.book, t.chapter.chapter)), Some(("b".to_owned(), 2)));
    }

    #[tokio::test]
    async fn complete_backlog_yields_none() {
        let library = library_with(&[("a", 2, vec![1, 2])]).await;
        assert_eq!(BacklogScanner::over(library.clone()).find_next_task().await.unwrap(), None);
        assert_eq!(library.list_written("a").await.unwrap(), BTreeSet::from([1, 2]));
    }

    #[tokio::test]
    async fn claim_while_scanning_moves_past_denied_books() {
        let library = library_with(&[("a", 3, vec![]), ("b", 3, vec![])]).await;
        let (policy, _) = test_policy(1);
        let quota = MemoryQuotaStore::new(policy);
        assert!(quota.claim("a").await.unwrap());

        let scanner = BacklogScanner::over(library);
        let outcome = scanner.find_next_claimed_task(&quota).await.unwrap();
        match outcome {
            ScanOutcome::Claimed(task) => assert_eq!((task.book.as_str(), task.chapter.chapter), ("b", 1)),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let outcome = scanner.find_next_claimed_task(&quota).await.unwrap();
        assert_eq!(
            outcome,
            ScanOutcome::Denied {
                books: vec!["a".to_owned(), "b".to_owned()]
            }
        );
    }

    #[tokio::test]
    async fn claim_while_scanning_reports_exhausted_backlog() {
        let library = library_with(&[("a", 1, vec![1])]).await;
        let (policy, _) = test_policy(5);
        let quota = MemoryQuotaStore::new(policy);
        let outcome = BacklogScanner::over(library)
            .find_next_claimed_task(&quota)
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome::Exhausted);
        assert_eq!(quota.record("a").await.unwrap(), None);
    }
}
