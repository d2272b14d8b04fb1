//! WorkerLoop: scan, claim, generate, persist, sleep, repeat.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backend::ContentBackend;
use crate::backoff::{Backoff, Pause};
use crate::formats::Task;
use crate::prompts::ChapterPrompt;
use crate::quota::QuotaStore;
use crate::scanner::{BacklogScanner, ScanOutcome};
use crate::store::Library;
use crate::world;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Scanning,
    Claiming,
    Generating,
    Persisting,
    Sleeping,
}

/// How scanning and claiming interleave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Find the first missing chapter, then claim its book.
    #[default]
    ClaimAfterScan,
    /// Claim each book's candidate while scanning; denied books are skipped.
    ClaimWhileScanning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Written { book: String, chapter: u32 },
    NoWork,
    ClaimDenied { book: String },
    /// Claim-while-scanning found work only in books that are at their daily cap.
    AllClaimsDenied { books: Vec<String> },
    Failed { book: Option<String>, reason: String },
}

impl IterationOutcome {
    pub fn pause(&self) -> Pause {
        match self {
            Self::Written { .. } => Pause::Pacing,
            Self::NoWork | Self::AllClaimsDenied { .. } => Pause::Idle,
            Self::ClaimDenied { .. } => Pause::ClaimDenied,
            Self::Failed { .. } => Pause::Failure,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Written { book, chapter } => format!("wrote {book} chapter {chapter}"),
            Self::NoWork => "no work".to_owned(),
            Self::ClaimDenied { book } => format!("claim denied for {book}"),
            Self::AllClaimsDenied { books } => format!("claims denied for {}", books.join(", ")),
            Self::Failed { reason, .. } => format!("failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: WorkerState,
    pub iterations: u64,
    pub chapters_written: u64,
    pub last_outcome: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Shared view of what the worker is doing, served by the health endpoint.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    inner: Arc<Mutex<StatusSnapshot>>,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatusSnapshot {
                state: WorkerState::Idle,
                iterations: 0,
                chapters_written: 0,
                last_outcome: None,
                updated_at: Utc::now(),
            })),
        }
    }
}

impl WorkerStatus {
    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatusSnapshot> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: WorkerState) {
        let mut snapshot = self.lock();
        if snapshot.state != state {
            tracing::debug!(from = ?snapshot.state, to = ?state, "worker state");
        }
        snapshot.state = state;
        snapshot.updated_at = Utc::now();
    }

    fn record(&self, outcome: &IterationOutcome) {
        let mut snapshot = self.lock();
        snapshot.iterations += 1;
        if matches!(outcome, IterationOutcome::Written { .. }) {
            snapshot.chapters_written += 1;
        }
        snapshot.last_outcome = Some(outcome.label());
        snapshot.updated_at = Utc::now();
    }
}

pub struct WorkerLoop {
    scanner: BacklogScanner,
    library: Arc<dyn Library>,
    quota: Arc<dyn QuotaStore>,
    backend: Arc<dyn ContentBackend>,
    backoff: Backoff,
    language: String,
    scan_mode: ScanMode,
    status: WorkerStatus,
}

impl WorkerLoop {
    pub fn new(
        library: Arc<dyn Library>,
        quota: Arc<dyn QuotaStore>,
        backend: Arc<dyn ContentBackend>,
    ) -> Self {
        Self {
            scanner: BacklogScanner::over(library.clone()),
            library,
            quota,
            backend,
            backoff: Backoff::default(),
            language: "English".to_owned(),
            scan_mode: ScanMode::default(),
            status: WorkerStatus::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_scan_mode(mut self, scan_mode: ScanMode) -> Self {
        self.scan_mode = scan_mode;
        self
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.clone()
    }

    /// Runs until `cancel` fires. A cancelled loop finishes the iteration in
    /// flight but never starts another scan.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(mode = ?self.scan_mode, "worker started");
        while !cancel.is_cancelled() {
            let outcome = self.run_once().await;
            let delay = self.backoff.delay_for(outcome.pause());

            self.status.set_state(WorkerState::Sleeping);
            tracing::debug!(delay_secs = delay.as_secs_f64(), "sleeping");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.status.set_state(WorkerState::Idle);
        tracing::info!("worker stopped");
    }

    /// One pass of the state machine; every failure is folded into the outcome.
    pub async fn run_once(&self) -> IterationOutcome {
        let outcome = self.iterate().await;
        match &outcome {
            IterationOutcome::Written { book, chapter } => {
                tracing::info!(book = %book, chapter, "chapter written");
            }
            IterationOutcome::NoWork => tracing::info!("backlog is empty"),
            IterationOutcome::ClaimDenied { book } => {
                tracing::info!(book = %book, "claim denied");
            }
            IterationOutcome::AllClaimsDenied { books } => {
                tracing::info!(books = books.len(), "every pending book is at its daily cap");
            }
            IterationOutcome::Failed { book, reason } => {
                tracing::error!(book = ?book, reason = %reason, "iteration failed");
            }
        }
        self.status.record(&outcome);
        self.status.set_state(WorkerState::Idle);
        outcome
    }

    async fn iterate(&self) -> IterationOutcome {
        self.status.set_state(WorkerState::Scanning);
        let task = match self.scan_mode {
            ScanMode::ClaimAfterScan => {
                let task = match self.scanner.find_next_task().await {
                    Ok(Some(task)) => task,
                    Ok(None) => return IterationOutcome::NoWork,
                    Err(err) => {
                        return IterationOutcome::Failed {
                            book: None,
                            reason: format!("scan backlog: {err:#}"),
                        };
                    }
                };

                self.status.set_state(WorkerState::Claiming);
                match self.quota.claim(&task.book).await {
                    Ok(true) => task,
                    Ok(false) => return IterationOutcome::ClaimDenied { book: task.book },
                    Err(err) => {
                        tracing::warn!(book = %task.book, error = %format!("{err:#}"), "quota claim failed; treating as denied");
                        return IterationOutcome::ClaimDenied { book: task.book };
                    }
                }
            }
            ScanMode::ClaimWhileScanning => {
                match self.scanner.find_next_claimed_task(self.quota.as_ref()).await {
                    Ok(ScanOutcome::Claimed(task)) => task,
                    Ok(ScanOutcome::Denied { books }) => {
                        return IterationOutcome::AllClaimsDenied { books };
                    }
                    Ok(ScanOutcome::Exhausted) => return IterationOutcome::NoWork,
                    Err(err) => {
                        return IterationOutcome::Failed {
                            book: None,
                            reason: format!("scan backlog: {err:#}"),
                        };
                    }
                }
            }
        };

        self.generate_and_persist(task).await
    }

    async fn generate_and_persist(&self, task: Task) -> IterationOutcome {
        self.status.set_state(WorkerState::Generating);
        tracing::info!(
            book = %task.book,
            chapter = task.chapter.chapter,
            title = %task.chapter.title,
            "generating chapter"
        );

        let world_context = match self.library.load_world_bible(&task.book).await {
            Ok(raw) => raw.as_deref().and_then(world::world_context),
            Err(err) => {
                tracing::warn!(book = %task.book, error = %format!("{err:#}"), "world bible unavailable");
                None
            }
        };
        let prompt = ChapterPrompt::for_task(&task, world_context.as_deref(), &self.language).render();

        let text = match self.backend.generate(&prompt).await {
            Ok(text) => text,
            Err(err) => {
                return IterationOutcome::Failed {
                    book: Some(task.book),
                    reason: format!("generate chapter {}: {err}", task.chapter.chapter),
                };
            }
        };
        let text = text.trim();
        if text.is_empty() {
            return IterationOutcome::Failed {
                book: Some(task.book),
                reason: format!("generate chapter {}: empty text", task.chapter.chapter),
            };
        }

        self.status.set_state(WorkerState::Persisting);
        if let Err(err) = self
            .library
            .write(&task.book, task.chapter.chapter, &task.chapter.title, text)
            .await
        {
            return IterationOutcome::Failed {
                book: Some(task.book),
                reason: format!("persist chapter {}: {err:#}", task.chapter.chapter),
            };
        }

        IterationOutcome::Written {
            book: task.book,
            chapter: task.chapter.chapter,
        }
    }
}
