//! World Bible: characters, places and lore that keep a long novel consistent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldBible {
    #[serde(default)]
    pub characters: Vec<WorldEntry>,
    #[serde(default)]
    pub places: Vec<WorldEntry>,
    /// Lore entries are objects such as `{"item": "Sword", "description": "..."}`;
    /// the non-`description` key names the kind of entry.
    #[serde(default)]
    pub lore: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldEntry {
    pub name: String,
    pub description: String,
}

impl WorldBible {
    /// Starter document offered for a book that has none yet.
    pub fn template() -> Self {
        let mut item = serde_json::Map::new();
        item.insert("item".to_owned(), "Item name".into());
        item.insert("description".to_owned(), "What it is and what it does.".into());
        let mut concept = serde_json::Map::new();
        concept.insert("concept".to_owned(), "Concept or event".into());
        concept.insert("description".to_owned(), "What it means for the story.".into());

        Self {
            characters: vec![WorldEntry {
                name: "Character name".to_owned(),
                description: "Appearance, personality, role.".to_owned(),
            }],
            places: vec![WorldEntry {
                name: "Place name".to_owned(),
                description: "What this place is like.".to_owned(),
            }],
            lore: vec![item, concept],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty() && self.places.is_empty() && self.lore.is_empty()
    }

    pub fn format_for_prompt(&self) -> String {
        let mut out = String::new();

        if !self.characters.is_empty() {
            out.push_str("KEY CHARACTERS:\n");
            for entry in &self.characters {
                out.push_str(&format!("- {}: {}\n", entry.name, entry.description));
            }
            out.push('\n');
        }

        if !self.places.is_empty() {
            out.push_str("KEY PLACES:\n");
            for entry in &self.places {
                out.push_str(&format!("- {}: {}\n", entry.name, entry.description));
            }
            out.push('\n');
        }

        if !self.lore.is_empty() {
            out.push_str("KEY LORE:\n");
            for entry in &self.lore {
                let description = entry
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let named = entry
                    .iter()
                    .find(|(key, _)| key.as_str() != "description");
                match named {
                    Some((kind, name)) => {
                        let name = name.as_str().map(str::to_owned).unwrap_or_else(|| name.to_string());
                        out.push_str(&format!("- {name} ({kind}): {description}\n"));
                    }
                    None => out.push_str(&format!("- {description}\n")),
                }
            }
        }

        out.trim().to_owned()
    }
}

/// Prompt-ready world context from a stored World Bible document.
///
/// Unparsable documents are passed through verbatim so hand-edited notes still
/// reach the model.
pub fn world_context(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let context = match serde_json::from_str::<WorldBible>(raw) {
        Ok(bible) => bible.format_for_prompt(),
        Err(_) => raw.to_owned(),
    };
    (!context.is_empty()).then_some(context)
}
