use anyhow::Context as _;

/// Installs the stderr subscriber. `RUST_LOG` wins over `default_directive`.
pub fn init(default_directive: &str) -> anyhow::Result<()> {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), default_directive)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn build_filter(
    from_env: Option<&str>,
    default_directive: &str,
) -> anyhow::Result<tracing_subscriber::EnvFilter> {
    let directive = from_env
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default_directive);
    tracing_subscriber::EnvFilter::try_new(directive)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_directive))
        .context("build log filter")
}
