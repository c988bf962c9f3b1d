//! Error types for the transport layer.

use thiserror::Error;

/// Errors raised while fetching a page or streaming a media file.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The connection or body stream ended before the transfer finished.
    #[error("transfer of {url} interrupted: {reason}")]
    Interrupted {
        /// The URL being transferred.
        url: String,
        /// What cut the transfer short.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl TransportError {
    /// Creates a network error, promoting reqwest timeouts to [`TransportError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an interrupted-transfer error.
    pub fn interrupted(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Interrupted {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` when repeating the request cannot succeed.
    ///
    /// Client errors (4xx) are permanent except 408 and 429; malformed URLs
    /// are permanent. Everything else may be transient.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => {
                (400..500).contains(status) && !matches!(status, 408 | 429)
            }
            Self::InvalidUrl { .. } => true,
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::Interrupted { .. }
            | Self::Client(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let error = TransportError::http_status("https://example.com/album/x", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "Expected '503' in: {msg}");
        assert!(msg.contains("https://example.com/album/x"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_permanence_classification() {
        assert!(TransportError::http_status("u", 404).is_permanent());
        assert!(TransportError::http_status("u", 410).is_permanent());
        assert!(!TransportError::http_status("u", 429).is_permanent());
        assert!(!TransportError::http_status("u", 408).is_permanent());
        assert!(!TransportError::http_status("u", 502).is_permanent());
        assert!(TransportError::invalid_url("nope").is_permanent());
        assert!(!TransportError::interrupted("u", "eof").is_permanent());
    }
}
