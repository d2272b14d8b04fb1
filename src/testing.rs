//! Fixtures shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{ContentBackend, GenerationError};
use crate::formats::{ChapterSpec, Outline};
use crate::provider::{Provider, ProviderError};

pub fn outline(chapters: u32) -> Outline {
    Outline {
        title: "Demo".to_owned(),
        genre: "Fantasy".to_owned(),
        chapters: (1..=chapters)
            .map(|i| ChapterSpec {
                chapter: i,
                title: format!("Chapter title {i}"),
                summary: format!("summary {i}"),
            })
            .collect(),
    }
}

/// Provider whose answer per model is fixed up front; records the models it was asked for.
#[derive(Default)]
pub struct ScriptedProvider {
    answers: HashMap<String, Result<String, ProviderError>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(mut self, model: &str, text: &str) -> Self {
        self.answers.insert(model.to_owned(), Ok(text.to_owned()));
        self
    }

    pub fn fail(mut self, model: &str, message: &str) -> Self {
        self.answers
            .insert(model.to_owned(), Err(ProviderError::new(message)));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, model: &str, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(model.to_owned());
        self.answers
            .get(model)
            .cloned()
            .unwrap_or_else(|| Err(ProviderError::new(format!("no answer scripted for {model}"))))
    }
}

/// Backend that replays queued answers and keeps the prompts it received.
///
/// Once the queue is empty every call fails.
#[derive(Default)]
pub struct FakeBackend {
    answers: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answering(texts: &[&str]) -> Self {
        let backend = Self::new();
        for text in texts {
            backend.push_ok(text);
        }
        backend
    }

    pub fn push_ok(&self, text: &str) {
        self.answers
            .lock()
            .unwrap()
            .push_back(Ok(text.to_owned()));
    }

    pub fn push_err(&self) {
        self.answers
            .lock()
            .unwrap()
            .push_back(Err(GenerationError::AllProvidersExhausted {
                failures: Vec::new(),
            }));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentBackend for FakeBackend {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::NoCandidates))
    }
}
