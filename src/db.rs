//! SQLite pool behind the crawl state store.
//!
//! Every pooled connection runs in WAL mode with a busy timeout, so
//! workers marking progress concurrently wait on each other instead of
//! failing with `SQLITE_BUSY`. The schema is migrated on every open.
//!
//! # Example
//!
//! ```no_run
//! use crawler_core::{CrawlState, Database};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = CrawlState::new(Database::new(Path::new("crawl.db")).await?);
//! state.initialize().await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

/// Pool size; SQLite serialises writers on the file lock anyway.
const MAX_CONNECTIONS: u32 = 5;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors opening or migrating the state database.
#[derive(Error, Debug)]
pub enum DbError {
    /// Opening a connection or running a query failed.
    #[error("database connection failed: {0}")]
    Connection(#[from] sqlx::Error),

    /// Applying the schema failed.
    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Shared handle to the state database; clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens `db_path`, creating the file if missing, and migrates the schema.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the file cannot be opened,
    /// or `DbError::Migration` if the schema cannot be applied.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Opens a private in-memory database.
    ///
    /// The pool holds a single connection, since each connection to
    /// `sqlite::memory:` sees its own empty database.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` or `DbError::Migration` as for [`Database::new`].
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Applies any pending migrations. Safe to call any number of times.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Migration` if a migration fails.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("schema up to date");
        Ok(())
    }

    /// The pool queries run on.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns `true` if the database file is in WAL journal mode.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the pragma cannot be read.
    #[instrument(skip(self))]
    pub async fn is_wal_enabled(&self) -> Result<bool, DbError> {
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode").fetch_one(&self.pool).await?;
        Ok(mode.eq_ignore_ascii_case("wal"))
    }

    /// Waits for checked-out connections to return, then closes them.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}
