use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::authoring::DEFAULT_CHAPTERS_HINT;
use crate::config::StoreMode;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// YAML file overriding environment settings.
    #[arg(long, global = true, env = "NOVELLOOM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root directory of local books.
    #[arg(long, global = true)]
    pub books_dir: Option<PathBuf>,

    /// Where outlines, chapters and quota records live.
    #[arg(long, global = true, value_enum)]
    pub store: Option<StoreMode>,

    /// Language the prose is written in.
    #[arg(long, global = true)]
    pub language: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate backlog chapters until stopped.
    Worker(WorkerArgs),
    Novel {
        #[command(subcommand)]
        command: NovelCommand,
    },
    Chapter {
        #[command(subcommand)]
        command: ChapterCommand,
    },
    World {
        #[command(subcommand)]
        command: WorldCommand,
    },
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },
}

#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Run a single iteration and exit.
    #[arg(long)]
    pub once: bool,

    /// Claim quota while scanning instead of after picking a task.
    #[arg(long)]
    pub claim_while_scanning: bool,

    /// Serve `GET /` and `GET /status` on this address.
    #[arg(long, env = "NOVELLOOM_HEALTH_ADDR")]
    pub health_addr: Option<SocketAddr>,

    /// Override MAX_CHAPTERS_PER_DAY.
    #[arg(long)]
    pub max_per_day: Option<u32>,
}

#[derive(Debug, Subcommand)]
pub enum NovelCommand {
    /// Suggest titles for a genre.
    Titles(TitlesArgs),
    /// Generate and save the outline of a new book.
    Create(CreateArgs),
    /// Regenerate the outline of an existing book.
    Outline(OutlineArgs),
}

#[derive(Debug, Args)]
pub struct TitlesArgs {
    #[arg(long)]
    pub genre: String,

    /// Free-form keywords for the suggestions.
    #[arg(long, default_value = "")]
    pub keywords: String,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub genre: String,

    /// Chapter count hint passed to the outline prompt (e.g. `500-700`).
    #[arg(long, default_value = DEFAULT_CHAPTERS_HINT)]
    pub chapters: String,
}

#[derive(Debug, Args)]
pub struct OutlineArgs {
    #[arg(long)]
    pub slug: String,

    #[arg(long)]
    pub genre: String,

    #[arg(long, default_value = DEFAULT_CHAPTERS_HINT)]
    pub chapters: String,

    /// Replace an outline that already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Subcommand)]
pub enum ChapterCommand {
    /// Write a reworked version of a chapter next to the original.
    Rework(ReworkArgs),
}

#[derive(Debug, Args)]
pub struct ReworkArgs {
    #[arg(long)]
    pub slug: String,

    #[arg(long)]
    pub chapter: u32,

    /// What to change.
    #[arg(long)]
    pub instructions: String,
}

#[derive(Debug, Subcommand)]
pub enum WorldCommand {
    /// Rebuild the World Bible from written chapters.
    Update(BookArgs),
    /// Print the World Bible (or a template when there is none).
    Show(BookArgs),
}

#[derive(Debug, Args)]
pub struct BookArgs {
    #[arg(long)]
    pub slug: String,
}

#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    /// Push local books to Firestore (overwrites cloud chapters).
    Up,
    /// Pull Firestore books that are missing locally.
    Down,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn worker_flags_parse() {
        let cli = Cli::parse_from([
            "novelloom",
            "--store",
            "hybrid",
            "worker",
            "--once",
            "--claim-while-scanning",
            "--max-per-day",
            "3",
        ]);
        assert_eq!(cli.global.store, Some(StoreMode::Hybrid));
        let Command::Worker(args) = cli.command else {
            panic!("expected worker command");
        };
        assert!(args.once);
        assert!(args.claim_while_scanning);
        assert_eq!(args.max_per_day, Some(3));
    }

    #[test]
    fn global_flags_are_accepted_after_subcommands() {
        let cli = Cli::parse_from(["novelloom", "sync", "down", "--books-dir", "/tmp/books"]);
        assert_eq!(cli.global.books_dir, Some(PathBuf::from("/tmp/books")));
        assert!(matches!(
            cli.command,
            Command::Sync {
                command: SyncCommand::Down
            }
        ));
    }

    #[test]
    fn create_uses_default_chapter_hint() {
        let cli = Cli::parse_from(["novelloom", "novel", "create", "--title", "T", "--genre", "G"]);
        let Command::Novel {
            command: NovelCommand::Create(args),
        } = cli.command
        else {
            panic!("expected novel create");
        };
        assert_eq!(args.chapters, DEFAULT_CHAPTERS_HINT);
    }
}
