//! CLI entry point for the catalog crawler.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crawler_core::{CrawlConfig, CrawlError, CrawlSummary, Crawler, HttpTransport, PoolStats};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod cli;

use cli::{Cli, Command};

/// Process outcome mapped to an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Partial,
    Failure,
    Interrupted,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => Self::SUCCESS,
            ProcessExit::Failure => Self::from(1),
            ProcessExit::Partial => Self::from(2),
            ProcessExit::Interrupted => Self::from(130),
        }
    }
}

/// Maps completed and abandoned task counts to the process exit outcome.
fn determine_exit_outcome(completed: usize, abandoned: usize) -> ProcessExit {
    if abandoned == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.default_log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?cli, "CLI arguments parsed");

    let mut config = match &cli.config {
        Some(path) => CrawlConfig::load(path)?,
        None => CrawlConfig::load_default()?,
    };
    cli.apply_overrides(&mut config);
    config.validate()?;
    debug!(?config, "effective configuration");

    let transport =
        HttpTransport::with_timeouts(config.connect_timeout_secs, config.read_timeout_secs)
            .context("failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping workers");
            interrupt.cancel();
        }
    });

    let crawler = Crawler::open(&config, Arc::new(transport))
        .await
        .with_context(|| format!("failed to open crawl state at '{}'", config.db_path.display()))?
        .with_cancellation(cancel);

    let result = match cli.command {
        Command::Status { json } => {
            print_summary(&crawler.summary().await?, json)?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Index => crawler.build_index().await,
        Command::Download => crawler.download_all().await,
        Command::Crawl => crawler.crawl().await,
    };

    let stats = match result {
        Ok(stats) => stats,
        Err(CrawlError::Cancelled) => {
            warn!("interrupted before any work started");
            return Ok(ProcessExit::Interrupted.into());
        }
        Err(e) => return Err(e.into()),
    };

    Ok(report(&crawler, &stats).into())
}

fn report(crawler: &Crawler, stats: &PoolStats) -> ProcessExit {
    let downloads = crawler.download_stats();
    info!(
        completed = stats.completed(),
        abandoned = stats.abandoned(),
        retried = stats.retried(),
        downloaded = downloads.downloaded(),
        skipped = downloads.skipped(),
        bytes = downloads.bytes(),
        "Crawl finished"
    );

    if stats.was_cancelled() {
        warn!("interrupted; run the same command again to resume");
        return ProcessExit::Interrupted;
    }
    if stats.abandoned() > 0 {
        warn!(abandoned = stats.abandoned(), "some tasks were abandoned; re-run to retry them");
    }
    determine_exit_outcome(stats.completed(), stats.abandoned())
}

fn print_summary(summary: &CrawlSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("Listing pages: {:>7} / {} visited", summary.pages_visited, summary.pages);
    println!("Albums:        {:>7} / {} visited", summary.albums_visited, summary.albums);
    println!("Songs:         {:>7} / {} resolved", summary.songs_resolved, summary.songs);
    println!("Downloaded:    {:>7} / {}", summary.songs_downloaded, summary.songs);
    Ok(())
}
