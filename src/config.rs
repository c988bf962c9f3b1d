//! Crawl configuration loaded from TOML.
//!
//! Every field has a default, so an absent or partial file is valid. The
//! binary layers command-line flags over the file values and validates the
//! merged result.
//!
//! ```toml
//! base_url = "https://downloads.khinsider.com/game-soundtracks"
//! db_path = "crawl.db"
//! songs_dir = "songs"
//! cache_dir = ".songcache"
//! workers = 50
//! max_attempts = 10
//! retry_delay_ms = 250
//! follow_albums = true
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pool::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_WORKERS, RetryPolicy};
use crate::task::{CatalogUrls, ListingPolicy};
use crate::transport::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Catalog index root crawled by default.
pub const DEFAULT_BASE_URL: &str = "https://downloads.khinsider.com/game-soundtracks";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Accepted range or format.
        expected: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Settings for one crawl run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlConfig {
    /// Catalog index root; listing page `n` is `<base_url>?page=n`.
    pub base_url: String,
    /// SQLite file holding crawl progress.
    pub db_path: PathBuf,
    /// Root of published songs.
    pub songs_dir: PathBuf,
    /// Root of in-progress downloads.
    pub cache_dir: PathBuf,
    /// Concurrent workers (1..=100).
    pub workers: usize,
    /// Attempts per task, including the first (1..=100).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry. 0 disables waiting.
    pub retry_delay_ms: u64,
    /// Concurrent parse jobs.
    pub parse_threads: usize,
    /// HTTP connect timeout.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout.
    pub read_timeout_secs: u64,
    /// Chain album fetches from listing pages during a full crawl.
    pub follow_albums: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            db_path: PathBuf::from("crawl.db"),
            songs_dir: PathBuf::from("songs"),
            cache_dir: PathBuf::from(".songcache"),
            workers: DEFAULT_WORKERS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: u64::try_from(DEFAULT_RETRY_DELAY.as_millis()).unwrap_or(250),
            parse_threads: std::thread::available_parallelism()
                .map_or(4, std::num::NonZeroUsize::get),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            follow_albums: true,
        }
    }
}

impl CrawlConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source: Box::new(source),
        })
    }

    /// Reads and parses `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Loads the default config file if one exists, otherwise returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error only when a file exists and cannot be read or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        match resolve_default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if CatalogUrls::parse(&self.base_url).is_err() {
            return Err(ConfigError::invalid("base_url", &self.base_url, "an absolute URL"));
        }
        if !(1..=100).contains(&self.workers) {
            return Err(ConfigError::invalid("workers", self.workers, "range 1..=100"));
        }
        if !(1..=100).contains(&self.max_attempts) {
            return Err(ConfigError::invalid("max_attempts", self.max_attempts, "range 1..=100"));
        }
        if self.retry_delay_ms > 60_000 {
            return Err(ConfigError::invalid(
                "retry_delay_ms",
                self.retry_delay_ms,
                "range 0..=60000",
            ));
        }
        if !(1..=256).contains(&self.parse_threads) {
            return Err(ConfigError::invalid("parse_threads", self.parse_threads, "range 1..=256"));
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }

    /// Retry policy for pool tasks and index discovery.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.retry_delay_ms))
    }

    /// Listing policy for a full crawl.
    #[must_use]
    pub fn listing_policy(&self) -> ListingPolicy {
        if self.follow_albums {
            ListingPolicy::FollowAlbums
        } else {
            ListingPolicy::RecordOnly
        }
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::invalid(field, value, "range 1..=3600"));
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/catalog-crawler/config.toml`
/// 2. `$HOME/.config/catalog-crawler/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("catalog-crawler").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(PathBuf::from(home).join(".config").join("catalog-crawler").join("config.toml"))
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CrawlConfig::default();
        config.validate().unwrap();
        assert_eq!(config.workers, 50);
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.songs_dir, PathBuf::from("songs"));
        assert_eq!(config.cache_dir, PathBuf::from(".songcache"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = CrawlConfig::from_toml_str("workers = 8\nfollow_albums = false\n").unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.listing_policy(), ListingPolicy::RecordOnly);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = CrawlConfig::from_toml_str("concurrency = 4\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_wrong_type_rejected() {
        assert!(CrawlConfig::from_toml_str("workers = \"many\"\n").is_err());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let cases = [
            CrawlConfig {
                workers: 0,
                ..CrawlConfig::default()
            },
            CrawlConfig {
                max_attempts: 101,
                ..CrawlConfig::default()
            },
            CrawlConfig {
                read_timeout_secs: 0,
                ..CrawlConfig::default()
            },
            CrawlConfig {
                base_url: "not a url".to_string(),
                ..CrawlConfig::default()
            },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })), "{config:?}");
        }
    }

    #[test]
    fn test_invalid_message_names_field() {
        let config = CrawlConfig {
            workers: 500,
            ..CrawlConfig::default()
        };
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("`workers`"), "{msg}");
        assert!(msg.contains("500"), "{msg}");
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "db_path = \"/var/lib/crawl.db\"\nmax_attempts = 3\n").unwrap();

        let config = CrawlConfig::load(&path).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/crawl.db"));
        assert_eq!(config.retry_policy().max_attempts(), 3);
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CrawlConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
