//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crawler_core::CrawlConfig;

/// Resumable crawler for a paginated soundtrack catalog.
///
/// Progress lives in a SQLite file, so any command can be interrupted and
/// re-run; finished pages, albums and songs are never fetched twice.
#[derive(Parser, Debug)]
#[command(name = "catalog-crawler")]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/catalog-crawler/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Catalog index root URL
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// SQLite file holding crawl progress
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Directory receiving finished songs
    #[arg(long, global = true, value_name = "DIR")]
    pub songs_dir: Option<PathBuf>,

    /// Directory for in-progress downloads
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Concurrent workers (1-100)
    #[arg(short = 'w', long, global = true, value_parser = clap::value_parser!(u16).range(1..=100))]
    pub workers: Option<u16>,

    /// Attempts per task before it is abandoned (1-100)
    #[arg(short = 'r', long, global = true, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub max_attempts: Option<u32>,

    /// Do not chain album fetches from listing pages during `crawl`
    #[arg(long, global = true)]
    pub no_follow: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Discover listing pages and record every album
    Index,
    /// Fetch every unvisited album and download every pending song
    Download,
    /// Index and download in one run
    Crawl,
    /// Show crawl progress
    Status {
        /// Print counters as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Overrides file configuration with flags given on the command line.
    pub fn apply_overrides(&self, config: &mut CrawlConfig) {
        if let Some(base_url) = &self.base_url {
            config.base_url.clone_from(base_url);
        }
        if let Some(db) = &self.db {
            config.db_path.clone_from(db);
        }
        if let Some(songs_dir) = &self.songs_dir {
            config.songs_dir.clone_from(songs_dir);
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir.clone_from(cache_dir);
        }
        if let Some(workers) = self.workers {
            config.workers = usize::from(workers);
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if self.no_follow {
            config.follow_albums = false;
        }
    }

    /// Default log level; `RUST_LOG` takes precedence over this.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_subcommand_required() {
        let err = Cli::try_parse_from(["catalog-crawler"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand);
    }

    #[test]
    fn test_cli_parses_each_subcommand() {
        assert_eq!(
            Cli::try_parse_from(["catalog-crawler", "index"]).unwrap().command,
            Command::Index
        );
        assert_eq!(
            Cli::try_parse_from(["catalog-crawler", "download"]).unwrap().command,
            Command::Download
        );
        assert_eq!(
            Cli::try_parse_from(["catalog-crawler", "crawl"]).unwrap().command,
            Command::Crawl
        );
        assert_eq!(
            Cli::try_parse_from(["catalog-crawler", "status", "--json"]).unwrap().command,
            Command::Status { json: true }
        );
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let cli = Cli::try_parse_from(["catalog-crawler", "crawl", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.default_log_level(), "trace");
    }

    #[test]
    fn test_cli_quiet_flag_sets_error_level() {
        let cli = Cli::try_parse_from(["catalog-crawler", "-q", "index"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.default_log_level(), "error");
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let err = Cli::try_parse_from(["catalog-crawler", "-q", "-v", "index"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_workers_range() {
        let cli = Cli::try_parse_from(["catalog-crawler", "crawl", "-w", "100"]).unwrap();
        assert_eq!(cli.workers, Some(100));

        for bad in ["0", "101"] {
            let err = Cli::try_parse_from(["catalog-crawler", "crawl", "-w", bad]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_max_attempts_zero_rejected() {
        let err = Cli::try_parse_from(["catalog-crawler", "crawl", "-r", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_overrides_replace_file_values() {
        let cli = Cli::try_parse_from([
            "catalog-crawler",
            "crawl",
            "--db",
            "/tmp/state.db",
            "--songs-dir",
            "/music",
            "-w",
            "4",
            "-r",
            "2",
            "--no-follow",
        ])
        .unwrap();
        let mut config = CrawlConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.db_path, PathBuf::from("/tmp/state.db"));
        assert_eq!(config.songs_dir, PathBuf::from("/music"));
        assert_eq!(config.cache_dir, PathBuf::from(".songcache"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_attempts, 2);
        assert!(!config.follow_albums);
    }

    #[test]
    fn test_cli_without_flags_keeps_file_values() {
        let cli = Cli::try_parse_from(["catalog-crawler", "status"]).unwrap();
        let mut config = CrawlConfig {
            workers: 12,
            ..CrawlConfig::default()
        };
        cli.apply_overrides(&mut config);
        assert_eq!(config.workers, 12);
        assert!(config.follow_albums);
    }
}
