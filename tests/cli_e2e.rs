//! End-to-end CLI tests for the catalog-crawler binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

use assert_cmd::Command;
use crawler_core::{CrawlState, Database, SongInfo};
use predicates::prelude::*;
use tempfile::TempDir;

/// Command isolated from any user config file.
fn crawler_cmd(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("catalog-crawler").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path()).env_remove("RUST_LOG");
    cmd
}

fn write_crawler_config(config_home: &std::path::Path, contents: &str) {
    let config_dir = config_home.join("catalog-crawler");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), contents).unwrap();
}

fn seed_progress(db_path: &std::path::Path) {
    tokio_test::block_on(async {
        let state = CrawlState::new(Database::new(db_path).await.unwrap());
        state.initialize().await.unwrap();
        state.record_page_count(4).await.unwrap();
        state.mark_page_visited(2).await.unwrap();
        state.insert_album_if_absent("https://e.com/game-soundtracks/album/ys").await.unwrap();
        let song = SongInfo::new("Ys", "Opening", "https://e.com/game-soundtracks/album/ys/01.mp3");
        state.record_songs(&[song]).await.unwrap();
    });
}

#[test]
fn test_binary_help_lists_subcommands() {
    let temp = TempDir::new().unwrap();
    crawler_cmd(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("index"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("crawl"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let temp = TempDir::new().unwrap();
    crawler_cmd(&temp).assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_status_on_fresh_database_reports_zeroes() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("crawl.db");

    crawler_cmd(&temp)
        .args(["status", "--json", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pages\": 0"))
        .stdout(predicate::str::contains("\"songs_downloaded\": 0"));
    assert!(db.exists());
}

#[test]
fn test_status_reports_seeded_progress() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("crawl.db");
    seed_progress(&db);

    crawler_cmd(&temp)
        .args(["status", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 / 4 visited"))
        .stdout(predicate::str::contains("0 / 1 visited"))
        .stdout(predicate::str::contains("0 / 1 resolved"));
}

#[test]
fn test_db_path_from_config_file() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("from-config.db");
    seed_progress(&db);
    write_crawler_config(temp.path(), &format!("db_path = {:?}\n", db.to_string_lossy()));

    crawler_cmd(&temp)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pages\": 4"));
}

#[test]
fn test_unknown_config_key_fails() {
    let temp = TempDir::new().unwrap();
    write_crawler_config(temp.path(), "concurrency = 4\n");

    crawler_cmd(&temp)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config file"));
}

#[test]
fn test_out_of_range_config_value_fails() {
    let temp = TempDir::new().unwrap();
    write_crawler_config(temp.path(), "workers = 500\n");

    crawler_cmd(&temp)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config value for `workers`"));
}

#[test]
fn test_zero_workers_flag_rejected() {
    let temp = TempDir::new().unwrap();
    crawler_cmd(&temp)
        .args(["crawl", "-w", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_explicit_missing_config_file_fails() {
    let temp = TempDir::new().unwrap();
    crawler_cmd(&temp)
        .args(["status", "--config"])
        .arg(temp.path().join("absent.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}
