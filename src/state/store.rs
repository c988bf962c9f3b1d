//! Repository seam for crawl state operations.
//!
//! Fetch tasks and the crawler depend on this trait rather than on
//! [`CrawlState`] directly, so tests can substitute an in-memory recorder.

use async_trait::async_trait;

use super::{CrawlState, CrawlSummary, Result};
use crate::model::SongInfo;

/// Data-access contract for crawl progress.
#[async_trait]
pub trait CrawlStateStore: Send + Sync + std::fmt::Debug {
    /// Creates the persisted schema if absent.
    async fn initialize(&self) -> Result<()>;

    /// Returns `true` once the listing page count has been recorded.
    async fn page_count_known(&self) -> Result<bool>;

    /// Records page 1 as visited and pages `2..=count` as unvisited.
    async fn record_page_count(&self, count: u32) -> Result<()>;

    /// Inserts an album unless known; returns `true` when newly inserted.
    async fn insert_album_if_absent(&self, album_url: &str) -> Result<bool>;

    /// Marks a listing page visited.
    async fn mark_page_visited(&self, page: u32) -> Result<()>;

    /// Returns listing pages not yet visited.
    async fn unvisited_pages(&self) -> Result<Vec<u32>>;

    /// Marks an album's song list as recorded.
    async fn mark_album_visited(&self, album_url: &str) -> Result<()>;

    /// Returns `true` if an album's song list has been recorded.
    async fn is_album_visited(&self, album_url: &str) -> Result<bool>;

    /// Returns albums whose song list has not been recorded.
    async fn unvisited_albums(&self) -> Result<Vec<String>>;

    /// Records songs found on an album page; returns how many were new.
    async fn record_songs(&self, songs: &[SongInfo]) -> Result<u64>;

    /// Stores a song's resolved media URL.
    async fn record_resolved_song(&self, song: &SongInfo) -> Result<()>;

    /// Marks a song as present at its destination.
    async fn mark_song_downloaded(&self, song: &SongInfo) -> Result<()>;

    /// Returns songs not yet downloaded.
    async fn pending_songs(&self) -> Result<Vec<SongInfo>>;

    /// Returns progress counters.
    async fn summary(&self) -> Result<CrawlSummary>;
}

#[async_trait]
impl CrawlStateStore for CrawlState {
    async fn initialize(&self) -> Result<()> {
        CrawlState::initialize(self).await
    }

    async fn page_count_known(&self) -> Result<bool> {
        CrawlState::page_count_known(self).await
    }

    async fn record_page_count(&self, count: u32) -> Result<()> {
        CrawlState::record_page_count(self, count).await
    }

    async fn insert_album_if_absent(&self, album_url: &str) -> Result<bool> {
        CrawlState::insert_album_if_absent(self, album_url).await
    }

    async fn mark_page_visited(&self, page: u32) -> Result<()> {
        CrawlState::mark_page_visited(self, page).await
    }

    async fn unvisited_pages(&self) -> Result<Vec<u32>> {
        CrawlState::unvisited_pages(self).await
    }

    async fn mark_album_visited(&self, album_url: &str) -> Result<()> {
        CrawlState::mark_album_visited(self, album_url).await
    }

    async fn is_album_visited(&self, album_url: &str) -> Result<bool> {
        CrawlState::is_album_visited(self, album_url).await
    }

    async fn unvisited_albums(&self) -> Result<Vec<String>> {
        CrawlState::unvisited_albums(self).await
    }

    async fn record_songs(&self, songs: &[SongInfo]) -> Result<u64> {
        CrawlState::record_songs(self, songs).await
    }

    async fn record_resolved_song(&self, song: &SongInfo) -> Result<()> {
        CrawlState::record_resolved_song(self, song).await
    }

    async fn mark_song_downloaded(&self, song: &SongInfo) -> Result<()> {
        CrawlState::mark_song_downloaded(self, song).await
    }

    async fn pending_songs(&self) -> Result<Vec<SongInfo>> {
        CrawlState::pending_songs(self).await
    }

    async fn summary(&self) -> Result<CrawlSummary> {
        CrawlState::summary(self).await
    }
}
