//! Page parsing: link and record extraction, run off the I/O scheduler.
//!
//! # Overview
//!
//! - [`PageParser`] - pure extraction functions over a page body
//! - [`CatalogParser`] - `scraper`-based implementation for the catalog layout
//! - [`ParseExecutor`] - bounded compute pool that runs parse jobs on
//!   blocking threads so CPU-bound HTML parsing never stalls network workers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use crawler_core::parser::{CatalogParser, ParseExecutor};
//!
//! # async fn example(body: String) -> Result<(), Box<dyn std::error::Error>> {
//! let executor = ParseExecutor::new(Arc::new(CatalogParser::new()?), 4);
//! let albums = executor
//!     .album_links(body, "https://example.com/game-soundtracks?page=2".to_string())
//!     .await?;
//! println!("{} albums", albums.len());
//! # Ok(())
//! # }
//! ```

mod catalog;
mod error;

pub use catalog::{CatalogParser, DEFAULT_ALBUM_PATH_MARKER};
pub use error::ParseError;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::model::SongInfo;

/// Extraction functions over a page body.
///
/// Implementations must be pure: the same body and URL always produce the
/// same result. Every function is fallible; a failure counts against the
/// calling task's retry budget.
pub trait PageParser: Send + Sync + std::fmt::Debug {
    /// Returns the number of listing pages advertised by the index page.
    fn extract_page_count(&self, body: &str, page_url: &str) -> Result<u32, ParseError>;

    /// Returns absolute album URLs linked from a listing page, deduplicated.
    fn extract_album_links(&self, body: &str, page_url: &str)
    -> Result<Vec<String>, ParseError>;

    /// Returns the songs listed on an album page, with unresolved URLs.
    fn extract_song_records(&self, body: &str, album_url: &str)
    -> Result<Vec<SongInfo>, ParseError>;

    /// Returns the direct media URL linked from a song page.
    fn extract_direct_media_url(&self, body: &str, song_url: &str)
    -> Result<String, ParseError>;
}

/// Bounded pool for parse jobs.
///
/// Jobs run on Tokio's blocking threads; a semaphore caps how many run at
/// once. The permit moves into the job, so a caller that is cancelled while
/// awaiting does not free a slot before the job actually finishes.
#[derive(Debug, Clone)]
pub struct ParseExecutor {
    parser: Arc<dyn PageParser>,
    permits: Arc<Semaphore>,
    threads: usize,
}

impl ParseExecutor {
    /// Creates an executor allowing at most `threads` concurrent parse jobs (minimum 1).
    #[must_use]
    pub fn new(parser: Arc<dyn PageParser>, threads: usize) -> Self {
        let threads = threads.max(1);
        Self {
            parser,
            permits: Arc::new(Semaphore::new(threads)),
            threads,
        }
    }

    /// Returns the concurrency bound.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Runs `job` against the parser on the compute pool.
    ///
    /// # Errors
    ///
    /// Returns the job's own [`ParseError`], or [`ParseError::Executor`] if the
    /// job panicked or the pool was shut down.
    pub async fn run<T, F>(&self, job: F) -> Result<T, ParseError>
    where
        F: FnOnce(&dyn PageParser) -> Result<T, ParseError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ParseError::Executor("parse pool closed".to_string()))?;
        let parser = Arc::clone(&self.parser);

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(parser.as_ref())
        })
        .await
        .map_err(|e| ParseError::Executor(e.to_string()))?
    }

    /// Extracts the listing page count.
    ///
    /// # Errors
    ///
    /// See [`ParseExecutor::run`].
    pub async fn page_count(&self, body: String, page_url: String) -> Result<u32, ParseError> {
        self.run(move |parser| parser.extract_page_count(&body, &page_url)).await
    }

    /// Extracts album links from a listing page.
    ///
    /// # Errors
    ///
    /// See [`ParseExecutor::run`].
    pub async fn album_links(
        &self,
        body: String,
        page_url: String,
    ) -> Result<Vec<String>, ParseError> {
        self.run(move |parser| parser.extract_album_links(&body, &page_url)).await
    }

    /// Extracts song records from an album page.
    ///
    /// # Errors
    ///
    /// See [`ParseExecutor::run`].
    pub async fn song_records(
        &self,
        body: String,
        album_url: String,
    ) -> Result<Vec<SongInfo>, ParseError> {
        let songs = self
            .run(move |parser| parser.extract_song_records(&body, &album_url))
            .await?;
        debug!(count = songs.len(), "parsed song records");
        Ok(songs)
    }

    /// Extracts the direct media URL from a song page.
    ///
    /// # Errors
    ///
    /// See [`ParseExecutor::run`].
    pub async fn media_url(&self, body: String, song_url: String) -> Result<String, ParseError> {
        self.run(move |parser| parser.extract_direct_media_url(&body, &song_url)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// Parser that tracks how many extraction calls overlap.
    #[derive(Debug, Default)]
    struct SlowParser {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl PageParser for SlowParser {
        fn extract_page_count(&self, _body: &str, _page_url: &str) -> Result<u32, ParseError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(1)
        }

        fn extract_album_links(
            &self,
            _body: &str,
            page_url: &str,
        ) -> Result<Vec<String>, ParseError> {
            Err(ParseError::missing("album links", page_url))
        }

        fn extract_song_records(
            &self,
            _body: &str,
            _album_url: &str,
        ) -> Result<Vec<SongInfo>, ParseError> {
            Ok(Vec::new())
        }

        fn extract_direct_media_url(
            &self,
            _body: &str,
            _song_url: &str,
        ) -> Result<String, ParseError> {
            panic!("parser bug")
        }
    }

    #[tokio::test]
    async fn test_executor_bounds_concurrency() {
        let parser = Arc::new(SlowParser::default());
        let executor = ParseExecutor::new(parser.clone(), 2);

        let jobs = (0..8).map(|_| executor.page_count(String::new(), "u".to_string()));
        let results = futures_util::future::join_all(jobs).await;

        assert!(results.iter().all(Result::is_ok));
        assert!(parser.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_executor_propagates_parse_error() {
        let executor = ParseExecutor::new(Arc::new(SlowParser::default()), 1);
        let err = executor
            .album_links(String::new(), "https://e.com/p".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingElement { .. }));
    }

    #[tokio::test]
    async fn test_executor_reports_panicking_job() {
        let executor = ParseExecutor::new(Arc::new(SlowParser::default()), 1);
        let err = executor.media_url(String::new(), "u".to_string()).await.unwrap_err();
        assert!(matches!(err, ParseError::Executor(_)));
    }

    #[test]
    fn test_executor_minimum_one_thread() {
        let executor = ParseExecutor::new(Arc::new(SlowParser::default()), 0);
        assert_eq!(executor.threads(), 1);
    }
}
