use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use base64::Engine as _;
use serde::Deserialize;

use crate::backoff::Backoff;
use crate::provider::{Candidate, gemini, groq};

/// One week; longer idle pauses are almost certainly a typo.
pub const MAX_CHECK_INTERVAL_MINUTES: f64 = 10_080.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreMode {
    /// Files under the books directory only.
    #[default]
    Local,
    /// Firestore only.
    Firestore,
    /// Local first, Firestore as fallback and mirror.
    Hybrid,
}

impl StoreMode {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "local" => Ok(Self::Local),
            "firestore" | "cloud" => Ok(Self::Firestore),
            "hybrid" => Ok(Self::Hybrid),
            other => anyhow::bail!("unsupported store mode: {other}"),
        }
    }

    pub fn uses_cloud(self) -> bool {
        !matches!(self, Self::Local)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub command: Option<String>,
    pub command_args: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FirestoreSettings {
    pub project_id: Option<String>,
    pub emulator_host: Option<String>,
    pub access_token: Option<String>,
    pub service_account_base64: Option<String>,
}

impl FirestoreSettings {
    /// Explicit project id, else the `project_id` of the encoded service account.
    pub fn resolve_project_id(&self) -> anyhow::Result<Option<String>> {
        if let Some(project_id) = &self.project_id {
            return Ok(Some(project_id.clone()));
        }
        let Some(encoded) = &self.service_account_base64 else {
            return Ok(None);
        };

        #[derive(Deserialize)]
        struct ServiceAccount {
            project_id: Option<String>,
        }

        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .context("decode FIREBASE_SERVICE_ACCOUNT_BASE64")?;
        let account: ServiceAccount =
            serde_json::from_slice(&raw).context("parse service account json")?;
        Ok(account.project_id.filter(|p| !p.is_empty()))
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub books_dir: PathBuf,
    pub max_chapters_per_day: u32,
    pub check_interval_minutes: f64,
    pub store: StoreMode,
    pub language: String,
    pub candidates: Vec<Candidate>,
    pub providers: ProviderSettings,
    pub firestore: FirestoreSettings,
    pub claim_retry_secs: u64,
    pub error_cooldown_secs: u64,
    pub pacing_secs: u64,
    pub provider_retry_delay_ms: u64,
}

/// Optional YAML overrides; keys mirror the environment variables in snake_case.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileOverrides {
    books_dir: Option<PathBuf>,
    max_chapters_per_day: Option<u32>,
    check_interval_minutes: Option<f64>,
    store: Option<String>,
    language: Option<String>,
    candidates: Option<Vec<String>>,
    gemini_api_key: Option<String>,
    gemini_base_url: Option<String>,
    groq_api_key: Option<String>,
    groq_base_url: Option<String>,
    openai_api_key: Option<String>,
    openai_base_url: Option<String>,
    command: Option<String>,
    command_args: Option<Vec<String>>,
    firestore_project_id: Option<String>,
    firestore_emulator_host: Option<String>,
    claim_retry_secs: Option<u64>,
    error_cooldown_secs: Option<u64>,
    pacing_secs: Option<u64>,
    provider_retry_delay_ms: Option<u64>,
}

impl Settings {
    /// `.env`, then the process environment, then the optional YAML file.
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let mut settings = Self::from_env()?;
        if let Some(path) = config_path {
            settings
                .apply_file(path)
                .with_context(|| format!("load config file: {}", path.display()))?;
        }
        Ok(settings)
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let candidates = match var("NOVELLOOM_CANDIDATES") {
            Some(raw) => Candidate::parse_list(&raw).context("parse NOVELLOOM_CANDIDATES")?,
            None => Candidate::default_chain(),
        };
        let command_args = match var("NOVELLOOM_COMMAND_ARGS") {
            Some(raw) => serde_json::from_str::<Vec<String>>(&raw)
                .context("NOVELLOOM_COMMAND_ARGS must be a JSON array of strings")?,
            None => Vec::new(),
        };

        Ok(Self {
            books_dir: var("NOVELLOOM_BOOKS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("books")),
            max_chapters_per_day: parse_var(&var, "MAX_CHAPTERS_PER_DAY", 30)?,
            check_interval_minutes: parse_var(&var, "CHECK_INTERVAL_MINUTES", 10.0)?,
            store: match var("NOVELLOOM_STORE") {
                Some(raw) => StoreMode::parse(&raw)?,
                None => StoreMode::default(),
            },
            language: var("NOVELLOOM_LANGUAGE").unwrap_or_else(|| "English".to_owned()),
            candidates,
            providers: ProviderSettings {
                gemini_api_key: var("GEMINI_API_KEY"),
                gemini_base_url: var("GEMINI_BASE_URL")
                    .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_owned()),
                groq_api_key: var("GROQ_API_KEY"),
                groq_base_url: var("GROQ_BASE_URL")
                    .unwrap_or_else(|| groq::DEFAULT_BASE_URL.to_owned()),
                openai_api_key: var("OPENAI_API_KEY"),
                openai_base_url: var("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_owned()),
                command: var("NOVELLOOM_COMMAND"),
                command_args,
            },
            firestore: FirestoreSettings {
                project_id: var("FIRESTORE_PROJECT_ID"),
                emulator_host: var("FIRESTORE_EMULATOR_HOST"),
                access_token: var("FIRESTORE_ACCESS_TOKEN"),
                service_account_base64: var("FIREBASE_SERVICE_ACCOUNT_BASE64"),
            },
            claim_retry_secs: parse_var(&var, "NOVELLOOM_CLAIM_RETRY_SECS", 5)?,
            error_cooldown_secs: parse_var(&var, "NOVELLOOM_ERROR_COOLDOWN_SECS", 300)?,
            pacing_secs: parse_var(&var, "NOVELLOOM_PACING_SECS", 2)?,
            provider_retry_delay_ms: parse_var(&var, "NOVELLOOM_PROVIDER_RETRY_DELAY_MS", 500)?,
        })
    }

    fn apply_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let raw = std::fs::read_to_string(path).context("read config file")?;
        let file: FileOverrides = serde_yaml::from_str(&raw).context("parse config yaml")?;
        self.apply(file)
    }

    fn apply(&mut self, file: FileOverrides) -> anyhow::Result<()> {
        if let Some(v) = file.books_dir {
            self.books_dir = v;
        }
        if let Some(v) = file.max_chapters_per_day {
            self.max_chapters_per_day = v;
        }
        if let Some(v) = file.check_interval_minutes {
            self.check_interval_minutes = v;
        }
        if let Some(v) = file.store {
            self.store = StoreMode::parse(&v)?;
        }
        if let Some(v) = file.language {
            self.language = v;
        }
        if let Some(list) = file.candidates {
            self.candidates = list
                .iter()
                .map(|raw| Candidate::parse(raw))
                .collect::<anyhow::Result<_>>()
                .context("parse candidates")?;
        }

        let providers = &mut self.providers;
        override_opt(&mut providers.gemini_api_key, file.gemini_api_key);
        override_opt(&mut providers.groq_api_key, file.groq_api_key);
        override_opt(&mut providers.openai_api_key, file.openai_api_key);
        override_opt(&mut providers.command, file.command);
        if let Some(v) = file.gemini_base_url {
            providers.gemini_base_url = v;
        }
        if let Some(v) = file.groq_base_url {
            providers.groq_base_url = v;
        }
        if let Some(v) = file.openai_base_url {
            providers.openai_base_url = v;
        }
        if let Some(v) = file.command_args {
            providers.command_args = v;
        }

        override_opt(&mut self.firestore.project_id, file.firestore_project_id);
        override_opt(&mut self.firestore.emulator_host, file.firestore_emulator_host);

        if let Some(v) = file.claim_retry_secs {
            self.claim_retry_secs = v;
        }
        if let Some(v) = file.error_cooldown_secs {
            self.error_cooldown_secs = v;
        }
        if let Some(v) = file.pacing_secs {
            self.pacing_secs = v;
        }
        if let Some(v) = file.provider_retry_delay_ms {
            self.provider_retry_delay_ms = v;
        }
        Ok(())
    }

    /// Sync always talks to Firestore, whatever the store mode.
    pub fn validate_for_sync(&self) -> anyhow::Result<()> {
        self.validate()?;
        if self.firestore.resolve_project_id()?.is_none() {
            anyhow::bail!("sync needs FIRESTORE_PROJECT_ID or FIREBASE_SERVICE_ACCOUNT_BASE64");
        }
        Ok(())
    }

    /// Startup preconditions; a worker with a bad configuration must not start.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_chapters_per_day == 0 {
            anyhow::bail!("MAX_CHAPTERS_PER_DAY must be > 0");
        }
        if !(self.check_interval_minutes > 0.0
            && self.check_interval_minutes <= MAX_CHECK_INTERVAL_MINUTES)
        {
            anyhow::bail!(
                "CHECK_INTERVAL_MINUTES must be between 0 and {MAX_CHECK_INTERVAL_MINUTES} (got {})",
                self.check_interval_minutes
            );
        }
        if self.candidates.is_empty() {
            anyhow::bail!("no generation candidates configured (NOVELLOOM_CANDIDATES)");
        }
        if self.store.uses_cloud() && self.firestore.resolve_project_id()?.is_none() {
            anyhow::bail!(
                "store mode {:?} needs FIRESTORE_PROJECT_ID or FIREBASE_SERVICE_ACCOUNT_BASE64",
                self.store
            );
        }
        Ok(())
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            idle: Duration::try_from_secs_f64(
                self.check_interval_minutes.min(MAX_CHECK_INTERVAL_MINUTES) * 60.0,
            )
            .unwrap_or(Duration::from_secs(60)),
            claim_denied: Duration::from_secs(self.claim_retry_secs),
            failure_cooldown: Duration::from_secs(self.error_cooldown_secs),
            pacing: Duration::from_secs(self.pacing_secs),
        }
    }

    pub fn provider_retry_delay(&self) -> Duration {
        Duration::from_millis(self.provider_retry_delay_ms)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid {key}={raw:?}: {err}")),
        None => Ok(default),
    }
}

fn override_opt(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()) {
        *slot = Some(value);
    }
}
