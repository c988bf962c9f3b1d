//! `reqwest`-backed [`Transport`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::{ByteStream, Page, Transport, TransportError};
use crate::user_agent;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-read timeout (5 minutes for slow media servers).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// HTTP transport with connection pooling.
///
/// Create once per run and share it (it is cheap to clone); the underlying
/// connection pool is released when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a transport with explicit timeout values.
    ///
    /// The read timeout applies per read, not to the whole transfer, so long
    /// media downloads are not cut off while data keeps flowing.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .user_agent(user_agent::default_crawler_user_agent())
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { client })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, TransportError> {
        Url::parse(url).map_err(|_| TransportError::invalid_url(url))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self), fields(url = %url))]
    async fn get(&self, url: &str) -> Result<Page, TransportError> {
        let response = self.send(url).await?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::network(url, e))?;
        debug!(status, bytes = body.len(), "page fetched");
        Ok(Page { status, body })
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn get_stream(&self, url: &str) -> Result<ByteStream, TransportError> {
        let response = self.send(url).await?;
        debug!(content_length = ?response.content_length(), "stream opened");
        let owned_url = url.to_string();
        Ok(response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| TransportError::network(owned_url.clone(), e)))
            .boxed())
    }
}
