//! Small text transforms shared by the stores, prompts and authoring flows.

use unicode_normalization::UnicodeNormalization as _;

/// Lowercase, hyphenated, ASCII identifier derived from a title.
///
/// Accents are stripped after NFD decomposition and `đ` folds to `d`. Any other
/// non-ASCII character and punctuation is dropped. Underscores separate words like
/// whitespace does, so a slug never contains `_` and `_v<millis>` stays reserved
/// for reworked versions.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase().replace('đ', "d");
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_dash = false;

    for ch in lowered.nfd() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_dash = true;
        }
    }

    slug
}

/// Best-effort inverse of [`slugify`] used when a book lost its outline.
pub fn title_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `NN-<slug>` where `NN` is the chapter number zero-padded to two digits.
pub fn chapter_file_stem(chapter: u32, title: &str) -> String {
    format!("{chapter:02}-{}", slugify(title))
}

pub fn chapter_file_name(chapter: u32, title: &str) -> String {
    format!("{}.md", chapter_file_stem(chapter, title))
}

/// Cloud document id for a chapter (`NN`).
pub fn chapter_doc_id(chapter: u32) -> String {
    format!("{chapter:02}")
}

/// Chapter number encoded in a chapter file name; versioned files are ignored.
pub fn chapter_number_from_file_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(".md")?;
    let (number, rest) = stem.split_once('-').unwrap_or((stem, ""));
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if is_versioned_stem(rest) {
        return None;
    }
    number.parse().ok()
}

fn is_versioned_stem(rest: &str) -> bool {
    rest.rsplit_once("_v")
        .is_some_and(|(_, version)| !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()))
}

pub fn chapter_heading(chapter: u32, title: &str) -> String {
    format!("# Chapter {chapter}: {title}")
}

/// Markdown body prefixed with the generated chapter heading.
pub fn with_heading(chapter: u32, title: &str, content: &str) -> String {
    format!("{}\n\n{}", chapter_heading(chapter, title), content.trim_start())
}

/// Splits a leading `# Chapter N: Title` heading off a markdown document.
///
/// Returns the heading title (if any) and the body.
pub fn split_heading(markdown: &str) -> (Option<String>, &str) {
    let Some(first_line) = markdown.lines().next() else {
        return (None, markdown);
    };
    let Some(heading) = first_line.strip_prefix("# ") else {
        return (None, markdown);
    };
    let title = heading
        .split_once(": ")
        .map(|(_, title)| title)
        .unwrap_or(heading)
        .trim()
        .to_owned();
    let body = markdown[first_line.len()..].trim_start_matches(['\r', '\n']);
    (Some(title), body)
}

/// Removes markdown code fences (```json ... ```) around model output.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_owned()
}

/// The outermost `{ ... }` span of `text`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parses a model-produced list of titles (one per line, bullets and numbers stripped).
pub fn parse_title_list(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_list_marker)
        .map(|line| line.trim().trim_matches('"').trim().to_owned())
        .filter(|line| !line.is_empty())
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return rest;
    }
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0
        && let Some(rest) = line[digits..].strip_prefix('.')
    {
        return rest;
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_folds_d_and_drops_punctuation() {
        assert_eq!(slugify("Đường Về  Nhà!"), "duong-ve-nha");
        assert_eq!(slugify("Chuyến Đi Bão Táp"), "chuyen-di-bao-tap");
        assert_eq!(slugify("  The Long -- Night  "), "the-long-night");
        assert_eq!(slugify("Chapter: One, Two?"), "chapter-one-two");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn slugify_strips_combining_marks() {
        assert_eq!(slugify("Cafe\u{0301} Noir"), "cafe-noir");
        assert_eq!(slugify("Café Noir"), "cafe-noir");
        assert_eq!(slugify("東京 Story"), "story");
    }

    #[test]
    fn underscores_never_reach_a_slug() {
        assert_eq!(slugify("Plan_v2"), "plan-v2");
        assert_eq!(chapter_file_name(1, "Plan_v2"), "01-plan-v2.md");
        assert_eq!(chapter_number_from_file_name("01-plan-v2.md"), Some(1));
    }

    #[test]
    fn chapter_file_names_are_zero_padded() {
        assert_eq!(chapter_file_name(2, "The Storm"), "02-the-storm.md");
        assert_eq!(chapter_file_name(120, "End"), "120-end.md");
        assert_eq!(chapter_doc_id(7), "07");
    }

    #[test]
    fn chapter_numbers_are_parsed_from_file_names() {
        assert_eq!(chapter_number_from_file_name("02-the-storm.md"), Some(2));
        assert_eq!(chapter_number_from_file_name("120-end.md"), Some(120));
        assert_eq!(chapter_number_from_file_name("07.md"), Some(7));
        assert_eq!(
            chapter_number_from_file_name("02-the-storm_v1767225600000.md"),
            None
        );
        assert_eq!(chapter_number_from_file_name("outline.json"), None);
        assert_eq!(chapter_number_from_file_name("notes-02.md"), None);
    }

    #[test]
    fn heading_round_trips_through_split() {
        let markdown = with_heading(3, "Into the Dark", "\nIt was late.");
        assert_eq!(markdown, "# Chapter 3: Into the Dark\n\nIt was late.");
        let (title, body) = split_heading(&markdown);
        assert_eq!(title.as_deref(), Some("Into the Dark"));
        assert_eq!(body, "It was late.");

        let (title, body) = split_heading("No heading here.");
        assert_eq!(title, None);
        assert_eq!(body, "No heading here.");
    }

    #[test]
    fn extracts_json_from_chatty_output() {
        let text = "Sure! Here it is:\n```json\n{\"a\": {\"b\": 1}}\n```\nEnjoy.";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_object("no json"), None);
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
    }

    #[test]
    fn title_lists_lose_their_markers() {
        let titles = parse_title_list("1. First\n2.  \"Second\"\n- Third\n\n* Fourth\n");
        assert_eq!(titles, vec!["First", "Second", "Third", "Fourth"]);
    }

    #[test]
    fn title_from_slug_capitalizes_words() {
        assert_eq!(title_from_slug("the-long-night"), "The Long Night");
    }
}
