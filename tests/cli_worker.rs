#![cfg(unix)]

use std::fs;
use std::path::Path;

use predicates::prelude::*;

const OUTLINE: &str = r#"{
  "title": "The Salt Road",
  "genre": "Fantasy",
  "chapters": [
    { "chapter": 1, "title": "Opening", "summary": "A caravan sets out." },
    { "chapter": 2, "title": "The Dunes", "summary": "The caravan is lost." }
  ]
}"#;

fn write_book(books_dir: &Path) -> anyhow::Result<()> {
    let book = books_dir.join("salt-road");
    fs::create_dir_all(&book)?;
    fs::write(book.join("outline.json"), OUTLINE)?;
    Ok(())
}

fn worker_cmd(books_dir: &Path, script: &str) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelloom");
    cmd.current_dir(books_dir)
        .env_remove("NOVELLOOM_STORE")
        .env_remove("NOVELLOOM_CONFIG")
        .env("RUST_LOG", "info")
        .env("NOVELLOOM_CANDIDATES", "command:local")
        .env("NOVELLOOM_COMMAND", "sh")
        .env(
            "NOVELLOOM_COMMAND_ARGS",
            serde_json::to_string(&["-c", script]).expect("encode args"),
        )
        .env("NOVELLOOM_PROVIDER_RETRY_DELAY_MS", "0")
        .args(["--store", "local", "--books-dir"])
        .arg(books_dir)
        .args(["worker", "--once"]);
    cmd
}

#[test]
fn worker_once_writes_the_first_missing_chapter() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_book(temp.path())?;

    worker_cmd(temp.path(), "cat >/dev/null; echo 'The caravan left at dawn.'")
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote salt-road chapter 1"));

    let chapter = fs::read_to_string(temp.path().join("salt-road/01-opening.md"))?;
    assert!(chapter.starts_with("# Chapter 1: Opening"), "{chapter}");
    assert!(chapter.contains("The caravan left at dawn."), "{chapter}");

    let quota: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(temp.path().join(".quota.json"))?)?;
    assert_eq!(quota["salt-road"]["count"], 1);
    Ok(())
}

#[test]
fn worker_once_respects_the_daily_cap() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_book(temp.path())?;
    let script = "cat >/dev/null; echo 'More sand.'";

    worker_cmd(temp.path(), script)
        .env("MAX_CHAPTERS_PER_DAY", "1")
        .assert()
        .success();
    worker_cmd(temp.path(), script)
        .env("MAX_CHAPTERS_PER_DAY", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("claim denied for salt-road"));

    assert!(!temp.path().join("salt-road/02-the-dunes.md").exists());
    Ok(())
}

#[test]
fn worker_once_reports_provider_failure() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_book(temp.path())?;

    worker_cmd(temp.path(), "cat >/dev/null; echo 'model overloaded' >&2; exit 3")
        .assert()
        .failure()
        .stderr(predicate::str::contains("iteration failed"));

    assert!(!temp.path().join("salt-road/01-opening.md").exists());
    Ok(())
}

#[test]
fn worker_once_without_books_has_no_work() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;

    worker_cmd(temp.path(), "cat >/dev/null; echo unused")
        .assert()
        .success()
        .stdout(predicate::str::contains("no work"));
    Ok(())
}

#[test]
fn worker_rejects_zero_daily_cap() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;

    worker_cmd(temp.path(), "true")
        .args(["--max-per-day", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MAX_CHAPTERS_PER_DAY must be > 0"));
    Ok(())
}
