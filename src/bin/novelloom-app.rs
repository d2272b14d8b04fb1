use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use novelloom::config::{Settings, StoreMode};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// YAML file overriding environment settings.
    #[arg(long, env = "NOVELLOOM_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    books_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    store: Option<StoreMode>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    novelloom::logging::init("info,tower_http=debug")?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting novelloom-app");

    let mut settings = Settings::load(args.config.as_deref()).context("load settings")?;
    if let Some(dir) = args.books_dir {
        settings.books_dir = dir;
    }
    if let Some(store) = args.store {
        settings.store = store;
    }
    let (library, _) = novelloom::runtime::build_library(&settings)?;
    let app = novelloom::app::publisher_router(library);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
