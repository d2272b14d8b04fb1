use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use pulldown_cmark::{Options, Parser};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use super::html_escape;
use crate::formats::Outline;
use crate::store::{Library, OutlineError};
use crate::text;

#[derive(Clone)]
struct PublisherState {
    library: Arc<dyn Library>,
}

#[derive(Debug, Serialize)]
struct BookSummary {
    slug: String,
    title: String,
    genre: String,
    chapters_total: usize,
    chapters_written: usize,
}

#[derive(Debug, Serialize)]
struct BookDetail {
    slug: String,
    title: String,
    genre: String,
    chapters: Vec<ChapterEntry>,
}

#[derive(Debug, Serialize)]
struct ChapterEntry {
    chapter: u32,
    title: String,
    written: bool,
}

pub fn publisher_router(library: Arc<dyn Library>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/books", get(list_books))
        .route("/api/books/:slug", get(book_detail))
        .route("/books/:slug/chapters/:chapter", get(chapter_page))
        .layer(TraceLayer::new_for_http())
        .with_state(PublisherState { library })
}

fn internal(err: impl std::fmt::Display) -> StatusCode {
    tracing::error!(error = %err, "publisher request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn check_slug(slug: &str) -> Result<(), StatusCode> {
    if slug.is_empty() || slug.starts_with('.') || slug.contains(['/', '\\']) {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(())
}

async fn load_outline(state: &PublisherState, slug: &str) -> Result<Outline, StatusCode> {
    check_slug(slug)?;
    match state.library.load_outline(slug).await {
        Ok(outline) => Ok(outline),
        Err(OutlineError::Missing(_)) => Err(StatusCode::NOT_FOUND),
        Err(err) => Err(internal(format!("{err:#}"))),
    }
}

async fn list_books(State(state): State<PublisherState>) -> Result<Json<Vec<BookSummary>>, StatusCode> {
    let books = state.library.list_books().await.map_err(|err| internal(format!("{err:#}")))?;
    let mut out = Vec::with_capacity(books.len());
    for slug in books {
        let outline = match state.library.load_outline(&slug).await {
            Ok(outline) => outline,
            Err(OutlineError::Missing(_)) => continue,
            Err(err) => {
                tracing::warn!(book = %slug, error = %format!("{err:#}"), "skipping unreadable book");
                continue;
            }
        };
        let written = state
            .library
            .list_written(&slug)
            .await
            .map_err(|err| internal(format!("{err:#}")))?;
        out.push(BookSummary {
            chapters_total: outline.chapters.len(),
            chapters_written: outline
                .chapters
                .iter()
                .filter(|spec| written.contains(&spec.chapter))
                .count(),
            title: outline.title,
            genre: outline.genre,
            slug,
        });
    }
    Ok(Json(out))
}

async fn book_detail(
    State(state): State<PublisherState>,
    Path(slug): Path<String>,
) -> Result<Json<BookDetail>, StatusCode> {
    let outline = load_outline(&state, &slug).await?;
    let written = state
        .library
        .list_written(&slug)
        .await
        .map_err(|err| internal(format!("{err:#}")))?;
    let chapters = outline
        .ordered_chapters()
        .into_iter()
        .map(|spec| ChapterEntry {
            chapter: spec.chapter,
            title: spec.title.clone(),
            written: written.contains(&spec.chapter),
        })
        .collect();
    Ok(Json(BookDetail {
        slug,
        title: outline.title,
        genre: outline.genre,
        chapters,
    }))
}

/// `/books/{slug}/chapters/{n}` renders HTML, `/books/{slug}/chapters/{n}.md` returns the source.
async fn chapter_page(
    State(state): State<PublisherState>,
    Path((slug, chapter)): Path<(String, String)>,
) -> Result<Response, StatusCode> {
    let (number, raw) = match chapter.strip_suffix(".md") {
        Some(number) => (number, true),
        None => (chapter.as_str(), false),
    };
    let number: u32 = number.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let outline = load_outline(&state, &slug).await?;

    let Some(record) = state
        .library
        .read(&slug, number)
        .await
        .map_err(|err| internal(format!("{err:#}")))?
    else {
        return Err(StatusCode::NOT_FOUND);
    };
    let markdown = text::with_heading(record.chapter, &record.title, &record.content);

    if raw {
        return Ok((
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            markdown,
        )
            .into_response());
    }

    let written = state
        .library
        .list_written(&slug)
        .await
        .map_err(|err| internal(format!("{err:#}")))?;
    let order: Vec<u32> = outline
        .ordered_chapters()
        .into_iter()
        .map(|spec| spec.chapter)
        .filter(|n| written.contains(n))
        .collect();
    let position = order.iter().position(|n| *n == number);
    let prev = position.and_then(|i| i.checked_sub(1)).map(|i| order[i]);
    let next = position.and_then(|i| order.get(i + 1).copied());

    Ok(Html(render_chapter_page(&slug, &outline.title, &markdown, prev, next)).into_response())
}

fn render_chapter_page(slug: &str, book_title: &str, markdown: &str, prev: Option<u32>, next: Option<u32>) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let mut body = String::new();
    pulldown_cmark::html::push_html(&mut body, Parser::new_ext(markdown, options));

    let slug = html_escape(slug);
    let mut nav = String::from("<nav>");
    if let Some(prev) = prev {
        nav.push_str(&format!(r#"<a rel="prev" href="/books/{slug}/chapters/{prev}">Previous</a> "#));
    }
    if let Some(next) = next {
        nav.push_str(&format!(r#"<a rel="next" href="/books/{slug}/chapters/{next}">Next</a>"#));
    }
    nav.push_str("</nav>");

    format!(
        "<!doctype html>\n<html>\n  <head><meta charset=\"utf-8\"><title>{title}</title></head>\n  <body>\n    <header><a href=\"/api/books/{slug}\">{title}</a></header>\n{body}    {nav}\n  </body>\n</html>\n",
        title = html_escape(book_title),
    )
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt as _;

    use super::*;
    use crate::store::{BookCatalog, ChapterStore, MemoryLibrary};
    use crate::testing::outline;

    async fn demo_router() -> anyhow::Result<Router> {
        let library = MemoryLibrary::new();
        library.save_outline("demo", &outline(3)).await?;
        library.write("demo", 1, "Chapter title 1", "It *began*.").await?;
        library.write("demo", 3, "Chapter title 3", "It ended.").await?;
        library.add_empty_book("draft").await;
        Ok(publisher_router(Arc::new(library)))
    }

    async fn get(app: Router, uri: &str) -> anyhow::Result<(StatusCode, String)> {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty())?)
            .await?;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, String::from_utf8(body.to_vec())?))
    }

    #[tokio::test]
    async fn lists_books_with_outlines() -> anyhow::Result<()> {
        let (status, body) = get(demo_router().await?, "/api/books").await?;
        assert_eq!(status, StatusCode::OK);
        let books: serde_json::Value = serde_json::from_str(&body)?;
        let books = books.as_array().cloned().unwrap_or_default();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0]["slug"], "demo");
        assert_eq!(books[0]["chapters_total"], 3);
        assert_eq!(books[0]["chapters_written"], 2);
        Ok(())
    }

    #[tokio::test]
    async fn book_detail_lists_chapters_in_order() -> anyhow::Result<()> {
        let (status, body) = get(demo_router().await?, "/api/books/demo").await?;
        assert_eq!(status, StatusCode::OK);
        let detail: serde_json::Value = serde_json::from_str(&body)?;
        let written: Vec<bool> = detail["chapters"]
            .as_array()
            .map(|chapters| chapters.iter().map(|c| c["written"] == true).collect())
            .unwrap_or_default();
        assert_eq!(written, vec![true, false, true]);

        let (status, _) = get(demo_router().await?, "/api/books/missing").await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn chapter_page_renders_html_with_navigation() -> anyhow::Result<()> {
        let (status, body) = get(demo_router().await?, "/books/demo/chapters/1").await?;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<h1>Chapter 1: Chapter title 1</h1>"), "{body}");
        assert!(body.contains("<em>began</em>"), "{body}");
        assert!(body.contains(r#"href="/books/demo/chapters/3""#), "{body}");
        assert!(!body.contains(r#"rel="prev""#), "{body}");
        Ok(())
    }

    #[tokio::test]
    async fn raw_markdown_and_missing_chapters() -> anyhow::Result<()> {
        let (status, body) = get(demo_router().await?, "/books/demo/chapters/3.md").await?;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("# Chapter 3: Chapter title 3"), "{body}");

        let (status, _) = get(demo_router().await?, "/books/demo/chapters/2").await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get(demo_router().await?, "/books/demo/chapters/two").await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        Ok(())
    }
}
