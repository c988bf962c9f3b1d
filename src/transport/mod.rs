//! HTTP transport seam used by every fetch task.
//!
//! The crawl engine never talks to `reqwest` directly. Tasks receive a
//! [`Transport`] handle that offers two operations:
//! - [`Transport::get`] - fetch a whole page body (listing, album, song pages)
//! - [`Transport::get_stream`] - open a chunked byte stream (media files)
//!
//! No retry or backoff happens here; all retry is task-level.
//!
//! # Example
//!
//! ```no_run
//! use crawler_core::transport::{HttpTransport, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new()?;
//! let page = transport.get("https://example.com/game-soundtracks").await?;
//! println!("{} bytes", page.body.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod http;

pub use error::TransportError;
pub use http::{CONNECT_TIMEOUT_SECS, HttpTransport, READ_TIMEOUT_SECS};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

/// Chunked response body of a streamed fetch.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// A fully read response.
#[derive(Debug, Clone)]
pub struct Page {
    /// HTTP status code (always a success status from [`HttpTransport`]).
    pub status: u16,
    /// Raw response body.
    pub body: Bytes,
}

impl Page {
    /// Decodes the body as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network access for fetch tasks.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Fetches `url` and reads the whole body.
    async fn get(&self, url: &str) -> Result<Page, TransportError>;

    /// Fetches `url` and returns its body as a stream of chunks.
    async fn get_stream(&self, url: &str) -> Result<ByteStream, TransportError>;
}
