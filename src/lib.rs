//! Catalog Crawler Core Library
//!
//! This library provides the crawl/download engine behind the
//! `catalog-crawler` tool, which mirrors a paginated soundtrack catalog
//! (listing pages → albums → songs) to local storage and resumes safely
//! across restarts.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`state`] - Durable crawl progress (pages, albums, songs)
//! - [`model`] - Song metadata and deterministic on-disk naming
//! - [`parser`] - HTML extraction and the bounded parse pool
//! - [`transport`] - HTTP transport seam for whole-body and streamed fetches
//! - [`download`] - Stage-then-publish song materialization
//! - [`task`] - The polymorphic [`FetchTask`] unit of work
//! - [`queue`] - In-memory task FIFO with drain detection
//! - [`pool`] - Fixed-size worker pool with bounded retry
//! - [`crawl`] - `build_index` / `download_all` / `crawl` entry points
//! - [`config`] - File and runtime configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crawl;
pub mod db;
pub mod download;
pub mod model;
pub mod parser;
pub mod pool;
pub mod queue;
pub mod state;
pub mod task;
pub mod transport;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, CrawlConfig};
pub use crawl::{CrawlError, Crawler};
pub use db::{Database, DbError};
pub use download::{DownloadError, DownloadStats, MaterializeOutcome, Materializer};
pub use model::{SongInfo, SongUrl};
pub use parser::{CatalogParser, PageParser, ParseError, ParseExecutor};
pub use pool::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_WORKERS, PoolError, PoolStats, RetryPolicy, WorkerPool,
};
pub use queue::{TaskLease, TaskQueue};
pub use state::{CrawlState, CrawlStateStore, CrawlSummary, StateError, StateErrorKind};
pub use task::{AlbumClaims, CatalogUrls, FetchTask, ListingPolicy, TaskContext, TaskError};
pub use transport::{ByteStream, HttpTransport, Transport, TransportError};
