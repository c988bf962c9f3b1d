//! Failure taxonomy for a single task attempt.

use thiserror::Error;

use crate::download::DownloadError;
use crate::parser::ParseError;
use crate::state::StateError;
use crate::transport::TransportError;

/// Why one attempt of a fetch task failed.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Network fetch failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Page content could not be interpreted.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The state store rejected a read or write.
    #[error(transparent)]
    State(#[from] StateError),

    /// Staging or publishing a song failed.
    #[error(transparent)]
    Download(#[from] DownloadError),
}

impl TaskError {
    /// Returns `true` when another attempt could plausibly succeed.
    ///
    /// Parse failures, permanent HTTP statuses (4xx other than 408/429),
    /// constraint or decode failures in the store and unresolved songs
    /// handed to the materializer are final.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) | Self::Download(DownloadError::Transport(e)) => !e.is_permanent(),
            Self::Parse(ParseError::Executor(_)) => true,
            Self::Parse(_) | Self::Download(DownloadError::Unresolved { .. }) => false,
            Self::State(e) => e.is_transient(),
            Self::Download(DownloadError::Io { .. }) => true,
        }
    }
}
