use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Outline document as stored in `outline.json` and in the cloud book document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub genre: String,
    pub chapters: Vec<ChapterSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSpec {
    pub chapter: u32,
    pub title: String,
    pub summary: String,
}

impl Outline {
    /// Chapters sorted by chapter number.
    pub fn ordered_chapters(&self) -> Vec<&ChapterSpec> {
        let mut chapters: Vec<&ChapterSpec> = self.chapters.iter().collect();
        chapters.sort_by_key(|c| c.chapter);
        chapters
    }

    pub fn chapter(&self, number: u32) -> Option<&ChapterSpec> {
        self.chapters.iter().find(|c| c.chapter == number)
    }

    /// Checks the outline invariants: at least one chapter, numbers contiguous from 1.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.title.trim().is_empty() {
            anyhow::bail!("outline title is empty");
        }
        if self.chapters.is_empty() {
            anyhow::bail!("outline has no chapters");
        }
        for (idx, chapter) in self.ordered_chapters().into_iter().enumerate() {
            let expected = idx as u32 + 1;
            if chapter.chapter != expected {
                anyhow::bail!(
                    "outline chapters must be contiguous from 1: expected {expected}, found {}",
                    chapter.chapter
                );
            }
        }
        Ok(())
    }
}

/// The persisted output of one chapter generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub chapter: u32,
    pub title: String,
    pub content: String,
}

/// Per-book daily claim counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub date: NaiveDate,
    pub count: u32,
}

/// A unit of work found by the backlog scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub book: String,
    pub book_title: String,
    pub genre: String,
    pub chapter: ChapterSpec,
    pub previous_summary: Option<String>,
}

impl Task {
    /// The first chapter of `outline` that is not in `written`, with continuity context.
    pub fn next_missing(book: &str, outline: &Outline, written: &BTreeSet<u32>) -> Option<Self> {
        let chapter = outline
            .ordered_chapters()
            .into_iter()
            .find(|c| !written.contains(&c.chapter))?;

        let previous_summary = match chapter.chapter {
            0 | 1 => None,
            n => outline.chapter(n - 1).map(|prev| prev.summary.clone()),
        };

        Some(Self {
            book: book.to_owned(),
            book_title: outline.title.clone(),
            genre: outline.genre.clone(),
            chapter: chapter.clone(),
            previous_summary,
        })
    }
}
