use std::time::{Duration, Instant};

use anyhow::Context as _;
use tokio::sync::Mutex;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before the metadata server says they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Where Firestore bearer tokens come from.
pub enum TokenSource {
    /// Emulator: requests are sent unauthenticated.
    None,
    Static(String),
    /// GCE/Cloud Run metadata server, cached until shortly before expiry.
    Metadata {
        client: reqwest::Client,
        cached: Mutex<Option<CachedToken>>,
    },
}

pub struct CachedToken {
    token: String,
    refresh_at: Instant,
}

impl TokenSource {
    pub fn metadata(client: reqwest::Client) -> Self {
        Self::Metadata {
            client,
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> anyhow::Result<Option<String>> {
        match self {
            Self::None => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::Metadata { client, cached } => {
                let mut cached = cached.lock().await;
                if let Some(hit) = cached.as_ref()
                    && Instant::now() < hit.refresh_at
                {
                    return Ok(Some(hit.token.clone()));
                }
                let fresh = fetch_metadata_token(client).await?;
                let token = fresh.token.clone();
                *cached = Some(fresh);
                Ok(Some(token))
            }
        }
    }
}

async fn fetch_metadata_token(client: &reqwest::Client) -> anyhow::Result<CachedToken> {
    #[derive(Debug, serde::Deserialize)]
    struct TokenResponse {
        access_token: String,
        #[serde(default)]
        expires_in: Option<u64>,
    }

    let resp = client
        .get(METADATA_TOKEN_URL)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .context("request metadata access token")?;
    if !resp.status().is_success() {
        anyhow::bail!("metadata token request failed ({})", resp.status());
    }
    let token: TokenResponse = resp.json().await.context("parse metadata token json")?;

    let lifetime = Duration::from_secs(token.expires_in.unwrap_or(300));
    tracing::debug!(expires_in = lifetime.as_secs(), "fetched metadata access token");
    Ok(CachedToken {
        token: token.access_token,
        refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
    })
}
