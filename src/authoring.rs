//! One-shot authoring flows: titles, outlines, reworks and World Bible updates.

use std::sync::Arc;

use anyhow::Context as _;

use crate::backend::ContentBackend;
use crate::formats::{ChapterRecord, Outline};
use crate::prompts;
use crate::store::{Library, OutlineError};
use crate::text;
use crate::world::WorldBible;

const OUTLINE_ATTEMPTS: usize = 3;
pub const DEFAULT_CHAPTERS_HINT: &str = "500-700";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedNovel {
    pub slug: String,
    pub outline: Outline,
}

pub struct Author {
    backend: Arc<dyn ContentBackend>,
    library: Arc<dyn Library>,
    language: String,
}

impl Author {
    pub fn new(
        backend: Arc<dyn ContentBackend>,
        library: Arc<dyn Library>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            library,
            language: language.into(),
        }
    }

    pub async fn suggest_titles(&self, genre: &str, keywords: &str) -> anyhow::Result<Vec<String>> {
        let response = self
            .backend
            .generate(&prompts::titles(genre, keywords, &self.language))
            .await
            .context("generate titles")?;
        let titles = text::parse_title_list(&response);
        if titles.is_empty() {
            anyhow::bail!("model returned no titles");
        }
        Ok(titles)
    }

    /// Asks for an outline until one parses and validates, up to a few attempts.
    pub async fn generate_outline(&self, title: &str, genre: &str, chapters_hint: &str) -> anyhow::Result<Outline> {
        let prompt = prompts::outline(title, genre, chapters_hint, &self.language);
        let mut last_error = None;
        for attempt in 1..=OUTLINE_ATTEMPTS {
            tracing::info!(title, attempt, "generating outline");
            let response = match self.backend.generate(&prompt).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "outline generation failed");
                    last_error = Some(anyhow::Error::new(err));
                    continue;
                }
            };
            match parse_outline(&response, title, genre) {
                Ok(outline) => return Ok(outline),
                Err(err) => {
                    tracing::warn!(attempt, error = %format!("{err:#}"), "model returned an unusable outline");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("no outline attempts were made"))
            .context(format!("generate outline after {OUTLINE_ATTEMPTS} attempts")))
    }

    /// Starts a new book. Refuses to touch a book that already has an outline.
    pub async fn create_novel(&self, title: &str, genre: &str, chapters_hint: &str) -> anyhow::Result<CreatedNovel> {
        let slug = text::slugify(title);
        if slug.is_empty() {
            anyhow::bail!("title {title:?} does not produce a usable slug");
        }
        match self.library.load_outline(&slug).await {
            Ok(_) | Err(OutlineError::Malformed { .. }) => {
                anyhow::bail!("book {slug} already exists");
            }
            Err(OutlineError::Missing(_)) => {}
            Err(OutlineError::Other(err)) => return Err(err.context("check existing book")),
        }

        let outline = self.generate_outline(title, genre, chapters_hint).await?;
        self.library
            .save_outline(&slug, &outline)
            .await
            .with_context(|| format!("save outline of {slug}"))?;
        tracing::info!(book = %slug, chapters = outline.chapters.len(), "novel created");
        Ok(CreatedNovel { slug, outline })
    }

    /// Rebuilds the outline of a book that lost it; the title is reconstructed from the slug.
    pub async fn regenerate_outline(&self, slug: &str, genre: &str, chapters_hint: &str, force: bool) -> anyhow::Result<Outline> {
        if !force && self.library.load_outline(slug).await.is_ok() {
            anyhow::bail!("book {slug} already has an outline (pass --force to replace it)");
        }
        let title = text::title_from_slug(slug);
        let outline = self.generate_outline(&title, genre, chapters_hint).await?;
        self.library
            .save_outline(slug, &outline)
            .await
            .with_context(|| format!("save outline of {slug}"))?;
        Ok(outline)
    }

    /// Rewrites a chapter per `instructions` into a new versioned record; the
    /// original stays as it is. Returns where the new version was stored.
    pub async fn rework_chapter(&self, slug: &str, chapter: u32, instructions: &str) -> anyhow::Result<String> {
        let original = self
            .library
            .read(slug, chapter)
            .await?
            .ok_or_else(|| anyhow::anyhow!("chapter {chapter} of {slug} has not been written"))?;

        let prompt = prompts::rework(&original.title, &original.content, instructions, &self.language);
        let reworked = self
            .backend
            .generate(&prompt)
            .await
            .with_context(|| format!("rework chapter {chapter} of {slug}"))?;

        let record = ChapterRecord {
            chapter,
            title: original.title,
            content: reworked.trim().to_owned(),
        };
        let location = self.library.write_version(slug, &record).await?;
        tracing::info!(book = slug, chapter, location = %location, "reworked chapter saved");
        Ok(location)
    }

    /// The stored World Bible, or a starter template when the book has none.
    pub async fn world_bible_or_template(&self, slug: &str) -> anyhow::Result<String> {
        match self.library.load_world_bible(slug).await? {
            Some(raw) => Ok(raw),
            None => serde_json::to_string_pretty(&WorldBible::template()).context("serialize template"),
        }
    }

    /// Re-derives the World Bible from every written chapter plus the current one.
    ///
    /// Returns `None` when the book has no written chapters yet.
    pub async fn update_world_bible(&self, slug: &str) -> anyhow::Result<Option<WorldBible>> {
        let outline = self.library.load_outline(slug).await?;
        let written = self.library.list_written(slug).await?;

        let mut chapters_text = String::new();
        for spec in outline.ordered_chapters() {
            if !written.contains(&spec.chapter) {
                continue;
            }
            let Some(record) = self.library.read(slug, spec.chapter).await? else {
                continue;
            };
            chapters_text.push_str(&format!(
                "\n\n--- CONTENT OF CHAPTER {}: {} ---\n\n{}",
                spec.chapter, spec.title, record.content
            ));
        }
        if chapters_text.is_empty() {
            tracing::info!(book = slug, "no written chapters; world bible left as is");
            return Ok(None);
        }

        let existing = self.library.load_world_bible(slug).await?;
        let outline_json = serde_json::to_string(&outline).context("serialize outline")?;
        let prompt = prompts::world_bible(&outline.title, &outline_json, &chapters_text, existing.as_deref());
        let response = self
            .backend
            .generate(&prompt)
            .await
            .context("generate world bible")?;

        let json = text::extract_json_object(&response)
            .ok_or_else(|| anyhow::anyhow!("model response contains no JSON object"))?;
        let bible: WorldBible = serde_json::from_str(json).context("parse world bible")?;
        let pretty = serde_json::to_string_pretty(&bible).context("serialize world bible")?;
        self.library.save_world_bible(slug, &pretty).await?;
        tracing::info!(
            book = slug,
            characters = bible.characters.len(),
            places = bible.places.len(),
            lore = bible.lore.len(),
            "world bible updated"
        );
        Ok(Some(bible))
    }
}

fn parse_outline(response: &str, title: &str, genre: &str) -> anyhow::Result<Outline> {
    let cleaned = text::strip_code_fences(response);
    let json = text::extract_json_object(&cleaned)
        .ok_or_else(|| anyhow::anyhow!("response contains no JSON object"))?;
    let mut outline: Outline = serde_json::from_str(json).context("parse outline json")?;
    if outline.title.trim().is_empty() {
        outline.title = title.to_owned();
    }
    if outline.genre.trim().is_empty() {
        outline.genre = genre.to_owned();
    }
    outline.validate()?;
    Ok(outline)
}
