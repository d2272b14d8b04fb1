//! Subcommand handlers behind the `novelloom` binary.

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::app::health_router;
use crate::authoring::Author;
use crate::cli::{
    ChapterCommand, Cli, Command, GlobalArgs, NovelCommand, SyncCommand, WorkerArgs, WorldCommand,
};
use crate::config::Settings;
use crate::runtime::{self, Runtime};
use crate::sync::{self as library_sync, SyncReport};
use crate::worker::{IterationOutcome, ScanMode, WorkerLoop};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.global.config.as_deref()).context("load settings")?;
    apply_global(&mut settings, &cli.global);

    match cli.command {
        Command::Worker(args) => {
            if let Some(max) = args.max_per_day {
                settings.max_chapters_per_day = max;
            }
            settings.validate()?;
            worker(&settings, &args).await.context("worker")
        }
        Command::Novel { command } => {
            settings.validate()?;
            novel(&settings, command).await
        }
        Command::Chapter {
            command: ChapterCommand::Rework(args),
        } => {
            settings.validate()?;
            let location = author(&settings)?
                .rework_chapter(&args.slug, args.chapter, &args.instructions)
                .await
                .context("chapter rework")?;
            println!("{location}");
            Ok(())
        }
        Command::World { command } => {
            settings.validate()?;
            world(&settings, command).await
        }
        Command::Sync { command } => {
            settings.validate_for_sync()?;
            sync(&settings, command).await
        }
    }
}

fn apply_global(settings: &mut Settings, global: &GlobalArgs) {
    if let Some(dir) = &global.books_dir {
        settings.books_dir = dir.clone();
    }
    if let Some(store) = global.store {
        settings.store = store;
    }
    if let Some(language) = &global.language {
        settings.language = language.clone();
    }
}

fn author(settings: &Settings) -> anyhow::Result<Author> {
    let (library, _) = runtime::build_library(settings)?;
    let backend = runtime::build_backend(settings)?;
    Ok(Author::new(backend, library, settings.language.clone()))
}

async fn worker(settings: &Settings, args: &WorkerArgs) -> anyhow::Result<()> {
    let runtime = Runtime::build(settings)?;
    let scan_mode = if args.claim_while_scanning {
        ScanMode::ClaimWhileScanning
    } else {
        ScanMode::ClaimAfterScan
    };
    let worker = WorkerLoop::new(runtime.library, runtime.quota, runtime.backend)
        .with_backoff(settings.backoff())
        .with_language(settings.language.clone())
        .with_scan_mode(scan_mode);

    if args.once {
        let outcome = worker.run_once().await;
        println!("{}", outcome.label());
        if let IterationOutcome::Failed { reason, .. } = outcome {
            anyhow::bail!("iteration failed: {reason}");
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stop requested; finishing the current iteration");
            signal_cancel.cancel();
        }
    });

    let health = match args.health_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|err| anyhow::anyhow!("bind {addr}: {err}"))?;
            tracing::info!(addr = %addr, "health endpoint listening");
            let app = health_router(worker.status());
            let shutdown = cancel.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
            }))
        }
        None => None,
    };

    worker.run(cancel.clone()).await;
    cancel.cancel();

    if let Some(handle) = health {
        handle
            .await
            .context("join health server")?
            .context("serve health endpoint")?;
    }
    Ok(())
}

async fn novel(settings: &Settings, command: NovelCommand) -> anyhow::Result<()> {
    let author = author(settings)?;
    match command {
        NovelCommand::Titles(args) => {
            let titles = author
                .suggest_titles(&args.genre, &args.keywords)
                .await
                .context("novel titles")?;
            for title in titles {
                println!("{title}");
            }
        }
        NovelCommand::Create(args) => {
            let created = author
                .create_novel(&args.title, &args.genre, &args.chapters)
                .await
                .context("novel create")?;
            println!(
                "created {} with {} chapters",
                created.slug,
                created.outline.chapters.len()
            );
        }
        NovelCommand::Outline(args) => {
            let outline = author
                .regenerate_outline(&args.slug, &args.genre, &args.chapters, args.force)
                .await
                .context("novel outline")?;
            println!(
                "outline of {} saved with {} chapters",
                args.slug,
                outline.chapters.len()
            );
        }
    }
    Ok(())
}

async fn world(settings: &Settings, command: WorldCommand) -> anyhow::Result<()> {
    let author = author(settings)?;
    match command {
        WorldCommand::Update(args) => {
            match author
                .update_world_bible(&args.slug)
                .await
                .context("world update")?
            {
                Some(world) => println!(
                    "{}",
                    serde_json::to_string_pretty(&world).context("serialize world bible")?
                ),
                None => println!("{} has no written chapters yet", args.slug),
            }
        }
        WorldCommand::Show(args) => {
            println!(
                "{}",
                author
                    .world_bible_or_template(&args.slug)
                    .await
                    .context("world show")?
            );
        }
    }
    Ok(())
}

async fn sync(settings: &Settings, command: SyncCommand) -> anyhow::Result<()> {
    let local = runtime::local_library(settings);
    let cloud = runtime::cloud_library(settings)?;
    let report: SyncReport = match command {
        SyncCommand::Up => library_sync::sync_up(local.as_ref(), cloud.as_ref())
            .await
            .context("sync up")?,
        SyncCommand::Down => library_sync::sync_down(cloud.as_ref(), local.as_ref())
            .await
            .context("sync down")?,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize sync report")?
    );
    if !report.failed_books.is_empty() {
        tracing::warn!(failed = ?report.failed_books, "some books were not synced");
    }
    Ok(())
}
