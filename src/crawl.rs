//! Top-level crawl operations over a persisted state store.
//!
//! - [`Crawler::build_index`] - learn the page count, then read every
//!   unvisited listing page, recording albums only
//! - [`Crawler::download_all`] - enumerate unvisited albums and fetch every
//!   song not yet on disk
//! - [`Crawler::crawl`] - both, chaining albums as listing pages discover them
//!
//! Every operation seeds its queue from the store, so an interrupted run
//! resumes where it stopped.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::CrawlConfig;
use crate::db::{Database, DbError};
use crate::download::{DownloadStats, Materializer};
use crate::parser::{CatalogParser, ParseError, ParseExecutor};
use crate::pool::{FailureType, PoolError, PoolStats, RetryDecision, WorkerPool};
use crate::state::{CrawlState, CrawlStateStore, CrawlSummary, StateError};
use crate::task::{AlbumClaims, CatalogUrls, FetchTask, ListingPolicy, TaskContext, TaskError};
use crate::transport::Transport;

/// Errors that stop a crawl operation as a whole.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Opening or migrating the database failed.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// Reading seeds or counters from the store failed.
    #[error("state store error: {0}")]
    State(#[from] StateError),

    /// The worker pool could not run.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The page parser could not be built.
    #[error("parser setup failed: {0}")]
    Parser(#[from] ParseError),

    /// The configured base URL is not an absolute URL.
    #[error("invalid base URL '{url}': {source}")]
    BaseUrl {
        /// Configured value.
        url: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The listing page count could not be learned.
    #[error("could not read the catalog index after {attempts} attempt(s): {source}")]
    IndexDiscovery {
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        #[source]
        source: TaskError,
    },

    /// The operation was cancelled before it started running tasks.
    #[error("crawl cancelled")]
    Cancelled,
}

/// Drives crawl operations for one catalog.
#[derive(Debug, Clone)]
pub struct Crawler {
    ctx: TaskContext,
    pool: WorkerPool,
    follow_policy: ListingPolicy,
}

impl Crawler {
    /// Creates a crawler from assembled parts.
    ///
    /// `ctx.listing_policy` applies to [`Crawler::crawl`]; the other
    /// operations pick their own policy.
    #[must_use]
    pub fn new(ctx: TaskContext, pool: WorkerPool) -> Self {
        let follow_policy = ctx.listing_policy;
        Self {
            ctx,
            pool,
            follow_policy,
        }
    }

    /// Opens the state database and wires up every collaborator from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] if the database cannot be opened, the base URL
    /// is invalid, or the worker count is zero.
    pub async fn open(
        config: &CrawlConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CrawlError> {
        let urls = CatalogUrls::parse(&config.base_url).map_err(|source| CrawlError::BaseUrl {
            url: config.base_url.clone(),
            source,
        })?;

        if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DbError::Connection(sqlx::Error::Io(e)))?;
        }
        let state = CrawlState::new(Database::new(&config.db_path).await?);
        state.initialize().await?;

        let ctx = TaskContext {
            transport,
            store: Arc::new(state),
            parser: ParseExecutor::new(Arc::new(CatalogParser::new()?), config.parse_threads),
            materializer: Materializer::new(&config.songs_dir, &config.cache_dir),
            urls,
            listing_policy: config.listing_policy(),
            album_claims: Arc::new(AlbumClaims::default()),
        };
        let pool = WorkerPool::new(config.workers, config.retry_policy())?;
        Ok(Self::new(ctx, pool))
    }

    /// Uses `token` to cancel running operations.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.pool = self.pool.with_cancellation(token);
        self
    }

    /// Counters of the download materializer.
    #[must_use]
    pub fn download_stats(&self) -> &DownloadStats {
        self.ctx.materializer.stats()
    }

    /// Progress counters from the store.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::State`] if the query fails.
    pub async fn summary(&self) -> Result<CrawlSummary, CrawlError> {
        Ok(self.ctx.store.summary().await?)
    }

    /// Discovers the listing pages if needed, then reads every unvisited
    /// page, recording the albums found without fetching them.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::IndexDiscovery`] if the page count cannot be
    /// learned, or a store/pool error.
    #[instrument(skip(self))]
    pub async fn build_index(&self) -> Result<PoolStats, CrawlError> {
        self.discover_page_count().await?;

        let seeds = self.listing_seeds().await?;
        info!(pages = seeds.len(), "building album index");
        self.run(ListingPolicy::RecordOnly, seeds).await
    }

    /// Enumerates every unvisited album and downloads every song not yet on disk.
    ///
    /// # Errors
    ///
    /// Returns a store or pool error; individual task failures are logged
    /// and counted, not returned.
    #[instrument(skip(self))]
    pub async fn download_all(&self) -> Result<PoolStats, CrawlError> {
        let seeds = self.download_seeds().await?;
        info!(tasks = seeds.len(), "downloading pending albums and songs");
        self.run(ListingPolicy::RecordOnly, seeds).await
    }

    /// Runs index building and downloading as one pool.
    ///
    /// # Errors
    ///
    /// See [`Crawler::build_index`] and [`Crawler::download_all`].
    #[instrument(skip(self))]
    pub async fn crawl(&self) -> Result<PoolStats, CrawlError> {
        self.discover_page_count().await?;

        let mut seeds = self.listing_seeds().await?;
        seeds.extend(self.download_seeds().await?);
        info!(tasks = seeds.len(), policy = ?self.follow_policy, "starting crawl");
        self.run(self.follow_policy, seeds).await
    }

    async fn run(
        &self,
        policy: ListingPolicy,
        seeds: Vec<FetchTask>,
    ) -> Result<PoolStats, CrawlError> {
        let claims = AlbumClaims::default();
        for seed in &seeds {
            if let FetchTask::Album(url) = seed {
                claims.claim(url);
            }
        }

        let mut ctx = self.ctx.clone();
        ctx.listing_policy = policy;
        ctx.album_claims = Arc::new(claims);
        Ok(self.pool.run(ctx, seeds).await?)
    }

    async fn listing_seeds(&self) -> Result<Vec<FetchTask>, CrawlError> {
        let pages = self.ctx.store.unvisited_pages().await?;
        Ok(pages.into_iter().map(FetchTask::ListingPage).collect())
    }

    async fn download_seeds(&self) -> Result<Vec<FetchTask>, CrawlError> {
        let albums = self.ctx.store.unvisited_albums().await?;
        let songs = self.ctx.store.pending_songs().await?;
        Ok(albums
            .into_iter()
            .map(FetchTask::Album)
            .chain(songs.into_iter().map(FetchTask::Song))
            .collect())
    }

    /// Reads the index root once to learn the page count, unless already known.
    async fn discover_page_count(&self) -> Result<(), CrawlError> {
        if self.ctx.store.page_count_known().await? {
            return Ok(());
        }

        let retry = self.pool.retry_policy();
        let cancel = self.pool.cancellation_token();
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CrawlError::Cancelled),
                result = self.read_index_root() => result,
            };
            let error = match result {
                Ok(pages) => {
                    info!(pages, "catalog index discovered");
                    return Ok(());
                }
                Err(error) => error,
            };

            warn!(
                attempt,
                max_attempts = retry.max_attempts(),
                error = %error,
                "reading catalog index failed"
            );
            match retry.should_retry(FailureType::from(&error), attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt = next;
                }
                RetryDecision::DoNotRetry { .. } => {
                    return Err(CrawlError::IndexDiscovery {
                        attempts: attempt,
                        source: error,
                    });
                }
            }
        }
    }

    /// Fetches the index root, records the albums on it and the page count.
    async fn read_index_root(&self) -> Result<u32, TaskError> {
        let url = self.ctx.urls.index_root().to_string();
        let body = self.ctx.transport.get(&url).await?.text();
        let pages = self.ctx.parser.page_count(body.clone(), url.clone()).await?;
        let albums = self.ctx.parser.album_links(body, url).await?;

        for album in &albums {
            self.ctx.store.insert_album_if_absent(album).await?;
        }
        self.ctx.store.record_page_count(pages).await?;
        Ok(pages)
    }
}
