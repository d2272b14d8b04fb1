use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    novelloom::logging::init("info").context("init logging")?;

    let cli = novelloom::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    novelloom::commands::run(cli).await
}
