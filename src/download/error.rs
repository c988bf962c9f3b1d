//! Error types for song materialization.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur while materializing a song on disk.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Opening or reading the media stream failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// File system error while staging or publishing (create, write, rename).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The song still points at its detail page.
    #[error("song '{song}' has no resolved media URL")]
    Unresolved {
        /// Display name of the song.
        song: String,
    },
}

impl DownloadError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// No `From<std::io::Error>`: every IO failure must name the path it happened on.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/songs/a.mp3"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/songs/a.mp3"), "Expected path in: {msg}");
        assert!(msg.contains("access denied"), "Expected cause in: {msg}");
    }

    #[test]
    fn test_download_error_transport_is_transparent() {
        let error =
            DownloadError::from(TransportError::http_status("https://cdn.e.com/a.mp3", 503));
        assert_eq!(error.to_string(), "HTTP 503 fetching https://cdn.e.com/a.mp3");
    }
}
