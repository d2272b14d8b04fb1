use crate::formats::Task;

#[derive(Debug, Clone)]
pub struct ChapterPrompt<'a> {
    pub book_title: &'a str,
    pub genre: &'a str,
    pub chapter_title: &'a str,
    pub chapter_summary: &'a str,
    pub previous_summary: Option<&'a str>,
    pub world_context: Option<&'a str>,
    pub language: &'a str,
}

impl<'a> ChapterPrompt<'a> {
    pub fn for_task(task: &'a Task, world_context: Option<&'a str>, language: &'a str) -> Self {
        Self {
            book_title: &task.book_title,
            genre: &task.genre,
            chapter_title: &task.chapter.title,
            chapter_summary: &task.chapter.summary,
            previous_summary: task.previous_summary.as_deref(),
            world_context,
            language,
        }
    }

    pub fn render(&self) -> String {
        let mut prompt = format!(
            "You are a talented novelist. Write the full text of the chapter titled \"{chapter_title}\" \
of the novel \"{book_title}\" (genre: \"{genre}\"). Write in {language}.\n\
The main events of this chapter: \"{chapter_summary}\".\n",
            chapter_title = self.chapter_title,
            book_title = self.book_title,
            genre = self.genre,
            language = self.language,
            chapter_summary = self.chapter_summary,
        );

        if let Some(previous) = self.previous_summary {
            prompt.push_str(&format!(
                "For continuity, this is the summary of the previous chapter: \"{previous}\".\n"
            ));
        }

        if let Some(world) = self.world_context {
            prompt.push_str("Stay consistent with the established world of the story:\n");
            prompt.push_str("BEGIN_WORLD_BIBLE\n");
            prompt.push_str(world);
            prompt.push_str("\nEND_WORLD_BIBLE\n");
        }

        prompt.push_str(
            "FORMAT REQUIREMENTS:\n\
1. Do NOT write any preface, greeting or commentary (no \"Here is the chapter you asked for\").\n\
2. Start IMMEDIATELY with the chapter text; the first line of your answer is the first line of the chapter.\n\
3. Focus on character development, atmosphere and moving the plot forward.\n\
4. Aim for roughly 2000-3000 words.\n",
        );
        prompt
    }
}

pub fn titles(genre: &str, keywords: &str, language: &str) -> String {
    let mut prompt = format!(
        "Suggest 5 compelling titles for a \"{genre}\" novel, written in {language}.\n"
    );
    if !keywords.trim().is_empty() {
        prompt.push_str(&format!(
            "If possible, weave in these keywords: \"{}\".\n",
            keywords.trim()
        ));
    }
    prompt.push_str("Return only the titles, one per line, without any explanation.\n");
    prompt
}

pub fn outline(title: &str, genre: &str, chapters_hint: &str, language: &str) -> String {
    format!(
        "You are a famous novelist specialising in \"{genre}\".\n\
Based on the novel title \"{title}\", create a detailed outline for a novel of about {chapters_hint} chapters, written in {language}.\n\
Return JSON with exactly this structure:\n\
{{\n  \"title\": \"{title}\",\n  \"genre\": \"{genre}\",\n  \"chapters\": [\n    {{ \"chapter\": 1, \"title\": \"Chapter 1 title\", \"summary\": \"Short summary of chapter 1.\" }},\n    {{ \"chapter\": 2, \"title\": \"Chapter 2 title\", \"summary\": \"Short summary of chapter 2.\" }}\n  ]\n}}\n\
Each object in chapters describes exactly one chapter; never merge chapters.\n\
Return only the JSON object, with no text around it.\n"
    )
}

pub fn rework(chapter_title: &str, original: &str, instructions: &str, language: &str) -> String {
    format!(
        "You are a skilled literary editor. Rewrite an existing chapter following the author's instructions. Write in {language}.\n\n\
Chapter title: \"{chapter_title}\"\n\n\
Original chapter:\n---\n{original}\n---\n\n\
Author's instructions: \"{instructions}\"\n\n\
REQUIREMENTS:\n\
1. Rewrite the whole chapter, weaving the instructions in naturally; do not just add a few sentences.\n\
2. Keep the good parts of the original unless the instructions ask to change them.\n\
3. Do NOT write any preface or commentary. Start immediately with the rewritten chapter.\n"
    )
}

pub fn world_bible(
    book_title: &str,
    outline_json: &str,
    chapters_text: &str,
    existing: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You maintain the World Bible of the novel \"{book_title}\".\n\
Outline:\nBEGIN_OUTLINE_JSON\n{outline_json}\nEND_OUTLINE_JSON\n\
Chapters written so far:\nBEGIN_CHAPTERS\n{chapters_text}\nEND_CHAPTERS\n"
    );
    if let Some(existing) = existing {
        prompt.push_str(&format!(
            "Current World Bible (update and extend it, keep facts that are still true):\n\
BEGIN_WORLD_BIBLE\n{existing}\nEND_WORLD_BIBLE\n"
        ));
    }
    prompt.push_str(
        "Return only a JSON object with this structure:\n\
{\n  \"characters\": [{ \"name\": \"...\", \"description\": \"...\" }],\n  \"places\": [{ \"name\": \"...\", \"description\": \"...\" }],\n  \"lore\": [{ \"item\": \"...\", \"description\": \"...\" }, { \"concept\": \"...\", \"description\": \"...\" }]\n}\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt<'a>(previous: Option<&'a str>, world: Option<&'a str>) -> ChapterPrompt<'a> {
        ChapterPrompt {
            book_title: "Demo",
            genre: "Fantasy",
            chapter_title: "The Gate",
            chapter_summary: "Lan opens the gate.",
            previous_summary: previous,
            world_context: world,
            language: "English",
        }
    }

    #[test]
    fn chapter_prompt_mentions_previous_summary_only_when_present() {
        let first = prompt(None, None).render();
        assert!(first.contains("\"The Gate\""));
        assert!(first.contains("Lan opens the gate."));
        assert!(!first.contains("previous chapter"));

        let later = prompt(Some("Lan finds a key."), None).render();
        assert!(later.contains("previous chapter: \"Lan finds a key.\""));
    }

    #[test]
    fn chapter_prompt_embeds_world_context() {
        let rendered = prompt(None, Some("KEY PLACES:\n- Hue")).render();
        assert!(rendered.contains("BEGIN_WORLD_BIBLE\nKEY PLACES:\n- Hue\nEND_WORLD_BIBLE"));
    }

    #[test]
    fn outline_prompt_describes_json_shape() {
        let rendered = outline("Demo", "Fantasy", "500-700", "English");
        assert!(rendered.contains("\"title\": \"Demo\""));
        assert!(rendered.contains("\"chapters\": ["));
    }
}
