mod provider_stub;

use std::collections::HashMap;

use novelloom::backend::{ContentBackend, GenerationError};
use novelloom::config::Settings;
use novelloom::runtime;
use provider_stub::{ProviderStub, Reply, StubConfig};

fn settings_for(stub: &ProviderStub) -> anyhow::Result<Settings> {
    let vars = HashMap::from([
        ("GEMINI_API_KEY", "test-gemini".to_owned()),
        ("GEMINI_BASE_URL", stub.gemini_base_url.clone()),
        ("GROQ_API_KEY", "test-groq".to_owned()),
        ("GROQ_BASE_URL", stub.groq_base_url.clone()),
        ("NOVELLOOM_PROVIDER_RETRY_DELAY_MS", "0".to_owned()),
    ]);
    Settings::from_lookup(|key| vars.get(key).cloned())
}

fn rate_limited() -> Reply {
    Reply::Status(429, "Resource has been exhausted (e.g. check quota).".to_owned())
}

#[tokio::test]
async fn rate_limited_gemini_falls_through_to_groq() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(
        StubConfig::default()
            .reply("gemini-2.0-flash", rate_limited())
            .reply("gemini-2.0-flash-lite", rate_limited())
            .reply("gemini-1.5-flash", rate_limited())
            .reply("llama3-8b-8192", Reply::Text("The storm broke at dawn.".to_owned())),
    );
    let backend = runtime::build_backend(&settings_for(&stub)?)?;

    let text = backend.generate("write chapter 1").await?;
    assert_eq!(text, "The storm broke at dawn.");
    assert_eq!(
        stub.hits(),
        vec![
            "gemini:gemini-2.0-flash",
            "gemini:gemini-2.0-flash-lite",
            "gemini:gemini-1.5-flash",
            "groq:llama3-8b-8192",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn first_success_stops_the_chain() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(
        StubConfig::default()
            .reply("gemini-2.0-flash", Reply::Status(500, "backend error".to_owned()))
            .reply("gemini-2.0-flash-lite", Reply::Text("Chapter text".to_owned())),
    );
    let backend = runtime::build_backend(&settings_for(&stub)?)?;

    assert_eq!(backend.generate("prompt").await?, "Chapter text");
    assert_eq!(stub.hits().len(), 2);
    Ok(())
}

#[tokio::test]
async fn exhausted_chain_reports_every_candidate() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(StubConfig::default().reply("gemini-2.0-flash", rate_limited()));
    let backend = runtime::build_backend(&settings_for(&stub)?)?;

    let err = backend.generate("prompt").await.unwrap_err();
    let GenerationError::AllProvidersExhausted { failures } = err else {
        panic!("expected exhausted chain, got {err:?}");
    };
    assert_eq!(failures.len(), 4);
    assert!(failures[0].error.is_rate_limited());
    assert!(!failures[1].error.is_rate_limited());
    Ok(())
}
