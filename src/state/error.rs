//! Error types for crawl state operations.

use std::fmt;

use thiserror::Error;

use crate::db::DbError;

/// Broad cause of a failed store query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateErrorKind {
    /// The database file was locked by another writer, or no pooled
    /// connection freed up in time.
    Busy,
    /// Reading or writing the database file failed.
    Io,
    /// A row broke a table constraint.
    Constraint,
    /// A stored value did not decode into the expected type.
    Decode,
    /// The pool was closed.
    Closed,
    /// Anything else reported by `SQLite`.
    Other,
}

impl StateErrorKind {
    fn of(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::Busy,
            sqlx::Error::PoolClosed => Self::Closed,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => Self::Decode,
            sqlx::Error::Database(db) => {
                // Primary result codes: 5 = SQLITE_BUSY, 6 = SQLITE_LOCKED.
                if matches!(db.code().as_deref(), Some("5" | "6")) {
                    Self::Busy
                } else if db.is_unique_violation()
                    || db.is_check_violation()
                    || db.is_foreign_key_violation()
                {
                    Self::Constraint
                } else {
                    Self::Other
                }
            }
            _ => Self::Other,
        }
    }

    /// Returns `true` if repeating the same statement may succeed.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Busy | Self::Io | Self::Other)
    }
}

impl fmt::Display for StateErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Busy => "busy",
            Self::Io => "io",
            Self::Constraint => "constraint",
            Self::Decode => "decode",
            Self::Closed => "closed",
            Self::Other => "other",
        })
    }
}

/// Errors that can occur while reading or updating crawl progress.
#[derive(Debug, Clone, Error)]
pub enum StateError {
    /// A query failed.
    #[error("state store error ({kind}): {message}")]
    Database {
        /// What went wrong, for retry decisions.
        kind: StateErrorKind,
        /// Driver message.
        message: String,
    },

    /// Creating or upgrading the schema failed.
    #[error("state store schema error: {0}")]
    Schema(String),

    /// A listing page count of zero was reported.
    #[error("invalid listing page count {0}: a catalog has at least one page")]
    InvalidPageCount(u32),
}

impl StateError {
    /// The query failure kind, if this error came from a query.
    #[must_use]
    pub fn kind(&self) -> Option<StateErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::Schema(_) | Self::InvalidPageCount(_) => None,
        }
    }

    /// Returns `true` if the failed operation is worth attempting again.
    ///
    /// Busy and IO failures are; constraint and decode failures repeat
    /// identically, as do schema errors and invalid arguments.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind().is_some_and(StateErrorKind::is_transient)
    }
}

impl From<sqlx::Error> for StateError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: StateErrorKind::of(&err),
            message: err.to_string(),
        }
    }
}

impl From<DbError> for StateError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Connection(source) => Self::from(source),
            DbError::Migration(source) => Self::Schema(source.to_string()),
        }
    }
}
