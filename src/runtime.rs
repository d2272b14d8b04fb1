//! Wires settings into concrete stores and backends.

use std::sync::Arc;

use anyhow::Context as _;

use crate::backend::{ContentBackend, FallbackChain};
use crate::config::{Settings, StoreMode};
use crate::firestore::FirestoreClient;
use crate::provider::ProviderRegistry;
use crate::quota::{FirestoreQuotaStore, LocalQuotaStore, QuotaPolicy, QuotaStore, SystemClock};
use crate::store::{FirestoreLibrary, HybridLibrary, Library, LocalLibrary};

pub struct Runtime {
    pub library: Arc<dyn Library>,
    pub quota: Arc<dyn QuotaStore>,
    pub backend: Arc<dyn ContentBackend>,
}

impl Runtime {
    pub fn build(settings: &Settings) -> anyhow::Result<Self> {
        let (library, firestore) = build_library(settings)?;
        let policy = quota_policy(settings);
        let quota: Arc<dyn QuotaStore> = match firestore {
            Some(client) => Arc::new(FirestoreQuotaStore::new(client, policy)),
            None => Arc::new(LocalQuotaStore::new(settings.books_dir.clone(), policy)),
        };
        let backend = build_backend(settings)?;
        Ok(Self {
            library,
            quota,
            backend,
        })
    }
}

pub fn quota_policy(settings: &Settings) -> QuotaPolicy {
    QuotaPolicy::new(settings.max_chapters_per_day, Arc::new(SystemClock))
}

pub fn build_backend(settings: &Settings) -> anyhow::Result<Arc<dyn ContentBackend>> {
    let registry = ProviderRegistry::from_settings(&settings.providers).context("build providers")?;
    let configured: Vec<&str> = registry.names().collect();
    tracing::debug!(providers = ?configured, "providers configured");
    for candidate in &settings.candidates {
        if registry.get(&candidate.provider).is_none() {
            tracing::warn!(candidate = %candidate, "candidate provider is not configured and will be skipped");
        }
    }
    Ok(Arc::new(FallbackChain::new(
        settings.candidates.clone(),
        registry,
        settings.provider_retry_delay(),
    )))
}

pub fn local_library(settings: &Settings) -> Arc<dyn Library> {
    Arc::new(LocalLibrary::new(settings.books_dir.clone()))
}

pub fn firestore_client(settings: &Settings) -> anyhow::Result<Arc<FirestoreClient>> {
    let client = FirestoreClient::from_settings(&settings.firestore).context("build firestore client")?;
    Ok(Arc::new(client))
}

pub fn cloud_library(settings: &Settings) -> anyhow::Result<Arc<dyn Library>> {
    Ok(Arc::new(FirestoreLibrary::new(firestore_client(settings)?)))
}

/// The library for the configured store mode, plus the Firestore client when one is in use.
pub fn build_library(
    settings: &Settings,
) -> anyhow::Result<(Arc<dyn Library>, Option<Arc<FirestoreClient>>)> {
    match settings.store {
        StoreMode::Local => {
            tracing::info!(books_dir = %settings.books_dir.display(), "using local store");
            Ok((local_library(settings), None))
        }
        StoreMode::Firestore => {
            tracing::info!("using firestore store");
            let client = firestore_client(settings)?;
            Ok((Arc::new(FirestoreLibrary::new(client.clone())), Some(client)))
        }
        StoreMode::Hybrid => {
            tracing::info!(books_dir = %settings.books_dir.display(), "using hybrid store");
            let client = firestore_client(settings)?;
            let cloud: Arc<dyn Library> = Arc::new(FirestoreLibrary::new(client.clone()));
            let hybrid = HybridLibrary::new(local_library(settings), cloud);
            Ok((Arc::new(hybrid), Some(client)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_mode_uses_the_books_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut settings = Settings::from_lookup(|_| None)?;
        settings.books_dir = dir.path().to_path_buf();

        let runtime = Runtime::build(&settings)?;
        runtime.library.save_outline("demo", &crate::testing::outline(1)).await?;
        assert!(dir.path().join("demo/outline.json").exists());
        assert!(runtime.quota.claim("demo").await?);
        Ok(())
    }
}
