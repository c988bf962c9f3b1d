//! Durable crawl progress backed by `SQLite`.
//!
//! The state store is the single source of truth for "what remains to do":
//! which listing pages have been read, which albums have had their song list
//! enumerated, and which songs are still missing on disk.
//!
//! Every mutating operation is one atomic statement (insert-or-ignore or
//! insert-or-update), so concurrent workers never race on the same logical
//! row and no cross-row locking is needed. The only multi-row write,
//! [`CrawlState::record_songs`], runs in a transaction.
//!
//! # Example
//!
//! ```no_run
//! use crawler_core::{CrawlState, Database};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = CrawlState::new(Database::new(Path::new("crawl.db")).await?);
//! state.initialize().await?;
//!
//! if !state.page_count_known().await? {
//!     state.record_page_count(42).await?;
//! }
//! for page in state.unvisited_pages().await? {
//!     println!("still to visit: {page}");
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod store;

pub use error::{StateError, StateErrorKind};
pub use store::CrawlStateStore;

use std::path::PathBuf;

use serde::Serialize;
use sqlx::Row;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::model::{SongInfo, SongUrl};

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StateError>;

/// Progress counters across all crawl tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    /// Listing pages known.
    pub pages: i64,
    /// Listing pages already read.
    pub pages_visited: i64,
    /// Albums discovered.
    pub albums: i64,
    /// Albums whose song list has been recorded.
    pub albums_visited: i64,
    /// Songs discovered.
    pub songs: i64,
    /// Songs whose direct media URL is known.
    pub songs_resolved: i64,
    /// Songs present at their destination.
    pub songs_downloaded: i64,
}

/// `SQLite` implementation of the crawl state store.
#[derive(Debug, Clone)]
pub struct CrawlState {
    db: Database,
}

impl CrawlState {
    /// Creates a state store over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates the schema if absent. Safe to call on every startup.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Schema`] if the schema cannot be applied.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        self.db.migrate().await?;
        Ok(())
    }

    /// Returns `true` once the listing page count has been recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn page_count_known(&self) -> Result<bool> {
        let known: i64 = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM albumpages)")
            .fetch_one(self.db.pool())
            .await?;
        Ok(known != 0)
    }

    /// Records `count` listing pages: page 1 visited (it was read to learn the
    /// count), pages `2..=count` unvisited.
    ///
    /// Existing rows keep their visited flag, so repeating the call is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidPageCount`] for a count of zero, or
    /// [`StateError::Database`] if the insert fails.
    #[instrument(skip(self))]
    pub async fn record_page_count(&self, count: u32) -> Result<()> {
        if count == 0 {
            return Err(StateError::InvalidPageCount(count));
        }

        sqlx::query(
            r"WITH RECURSIVE pages(n) AS (
                  SELECT 1
                  UNION ALL
                  SELECT n + 1 FROM pages WHERE n < ?
              )
              INSERT INTO albumpages (page, visited)
              SELECT n, CASE WHEN n = 1 THEN 1 ELSE 0 END FROM pages WHERE true
              ON CONFLICT (page) DO UPDATE SET visited = MAX(visited, excluded.visited)",
        )
        .bind(i64::from(count))
        .execute(self.db.pool())
        .await?;

        debug!(count, "recorded listing page count");
        Ok(())
    }

    /// Inserts an album URL unless it is already known.
    ///
    /// Returns `true` when this call created the record.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the insert fails.
    #[instrument(skip(self))]
    pub async fn insert_album_if_absent(&self, album_url: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO albums (album_url) VALUES (?) ON CONFLICT (album_url) DO NOTHING",
        )
        .bind(album_url)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Marks a listing page visited, inserting it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the upsert fails.
    #[instrument(skip(self))]
    pub async fn mark_page_visited(&self, page: u32) -> Result<()> {
        sqlx::query(
            "INSERT INTO albumpages (page, visited) VALUES (?, 1) \
             ON CONFLICT (page) DO UPDATE SET visited = 1",
        )
        .bind(i64::from(page))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Snapshot of listing pages not yet visited, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn unvisited_pages(&self) -> Result<Vec<u32>> {
        let pages: Vec<i64> =
            sqlx::query_scalar("SELECT page FROM albumpages WHERE visited = 0 ORDER BY page")
                .fetch_all(self.db.pool())
                .await?;
        Ok(pages.into_iter().filter_map(|p| u32::try_from(p).ok()).collect())
    }

    /// Marks an album visited, inserting it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the upsert fails.
    #[instrument(skip(self))]
    pub async fn mark_album_visited(&self, album_url: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO albums (album_url, visited) VALUES (?, 1) \
             ON CONFLICT (album_url) DO UPDATE SET visited = 1",
        )
        .bind(album_url)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Returns `true` if the album's song list has been recorded. Unknown
    /// albums are unvisited.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn is_album_visited(&self, album_url: &str) -> Result<bool> {
        let visited: Option<bool> =
            sqlx::query_scalar("SELECT visited FROM albums WHERE album_url = ?")
                .bind(album_url)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(visited.unwrap_or(false))
    }

    /// Snapshot of albums whose song list has not been recorded, in discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn unvisited_albums(&self) -> Result<Vec<String>> {
        let albums = sqlx::query_scalar(
            "SELECT album_url FROM albums WHERE visited = 0 ORDER BY discovered_at, rowid",
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(albums)
    }

    /// Records songs found on an album page, ignoring songs already known.
    ///
    /// Returns the number of newly inserted songs.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the transaction fails.
    #[instrument(skip(self, songs), fields(count = songs.len()))]
    pub async fn record_songs(&self, songs: &[SongInfo]) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;
        let mut inserted = 0;
        for song in songs {
            let result = sqlx::query(
                r"INSERT INTO songs (file_path, album_title, track_title, url, resolved)
                  VALUES (?, ?, ?, ?, ?)
                  ON CONFLICT (file_path) DO NOTHING",
            )
            .bind(song.path_key())
            .bind(&song.album)
            .bind(&song.title)
            .bind(song.url.as_str())
            .bind(song.url.is_resolved())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Stores the resolved media URL for a song that is not yet downloaded.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the upsert fails.
    #[instrument(skip(self, song), fields(song = %song))]
    pub async fn record_resolved_song(&self, song: &SongInfo) -> Result<()> {
        sqlx::query(
            r"INSERT INTO songs (file_path, album_title, track_title, url, resolved)
              VALUES (?, ?, ?, ?, 1)
              ON CONFLICT (file_path) DO UPDATE
                  SET url = excluded.url, resolved = 1, updated_at = datetime('now')
                  WHERE downloaded = 0",
        )
        .bind(song.path_key())
        .bind(&song.album)
        .bind(&song.title)
        .bind(song.url.as_str())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Marks a song as present at its destination.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the upsert fails.
    #[instrument(skip(self, song), fields(song = %song))]
    pub async fn mark_song_downloaded(&self, song: &SongInfo) -> Result<()> {
        sqlx::query(
            r"INSERT INTO songs (file_path, album_title, track_title, url, resolved, downloaded)
              VALUES (?, ?, ?, ?, ?, 1)
              ON CONFLICT (file_path) DO UPDATE
                  SET downloaded = 1, updated_at = datetime('now')",
        )
        .bind(song.path_key())
        .bind(&song.album)
        .bind(&song.title)
        .bind(song.url.as_str())
        .bind(song.url.is_resolved())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Songs known but not yet downloaded, resolved or not.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn pending_songs(&self) -> Result<Vec<SongInfo>> {
        let rows = sqlx::query(
            r"SELECT file_path, album_title, track_title, url, resolved
              FROM songs
              WHERE downloaded = 0
              ORDER BY rowid",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<SongInfo> {
                let file_path: String = row.try_get("file_path")?;
                let url: String = row.try_get("url")?;
                let resolved: bool = row.try_get("resolved")?;
                Ok(SongInfo {
                    album: row.try_get("album_title")?,
                    title: row.try_get("track_title")?,
                    file_path: file_path.split('/').collect::<PathBuf>(),
                    url: if resolved { SongUrl::Media(url) } else { SongUrl::Detail(url) },
                })
            })
            .collect()
    }

    /// Returns progress counters across all tables.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<CrawlSummary> {
        let row = sqlx::query(
            r"SELECT
                (SELECT COUNT(*) FROM albumpages) AS pages,
                (SELECT COUNT(*) FROM albumpages WHERE visited = 1) AS pages_visited,
                (SELECT COUNT(*) FROM albums) AS albums,
                (SELECT COUNT(*) FROM albums WHERE visited = 1) AS albums_visited,
                (SELECT COUNT(*) FROM songs) AS songs,
                (SELECT COUNT(*) FROM songs WHERE resolved = 1) AS songs_resolved,
                (SELECT COUNT(*) FROM songs WHERE downloaded = 1) AS songs_downloaded",
        )
        .fetch_one(self.db.pool())
        .await?;

        Ok(CrawlSummary {
            pages: row.try_get("pages")?,
            pages_visited: row.try_get("pages_visited")?,
            albums: row.try_get("albums")?,
            albums_visited: row.try_get("albums_visited")?,
            songs: row.try_get("songs")?,
            songs_resolved: row.try_get("songs_resolved")?,
            songs_downloaded: row.try_get("songs_downloaded")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn state() -> CrawlState {
        let state = CrawlState::new(Database::new_in_memory().await.unwrap());
        state.initialize().await.unwrap();
        state
    }

    #[tokio::test]
    async fn test_page_count_unknown_on_fresh_store() {
        let state = state().await;
        assert!(!state.page_count_known().await.unwrap());
        assert!(state.unvisited_pages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_page_count_marks_first_page_visited() {
        let state = state().await;
        state.record_page_count(4).await.unwrap();

        assert!(state.page_count_known().await.unwrap());
        assert_eq!(state.unvisited_pages().await.unwrap(), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_record_page_count_single_page() {
        let state = state().await;
        state.record_page_count(1).await.unwrap();
        assert!(state.page_count_known().await.unwrap());
        assert!(state.unvisited_pages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_page_count_zero_rejected() {
        let state = state().await;
        let err = state.record_page_count(0).await.unwrap_err();
        assert!(matches!(err, StateError::InvalidPageCount(0)));
    }

    #[tokio::test]
    async fn test_record_page_count_keeps_visited_pages() {
        let state = state().await;
        state.record_page_count(3).await.unwrap();
        state.mark_page_visited(2).await.unwrap();
        state.record_page_count(5).await.unwrap();
        assert_eq!(state.unvisited_pages().await.unwrap(), vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_insert_album_if_absent_reports_new_rows() {
        let state = state().await;
        assert!(state.insert_album_if_absent("https://e.com/album/a").await.unwrap());
        assert!(!state.insert_album_if_absent("https://e.com/album/a").await.unwrap());
        assert_eq!(state.summary().await.unwrap().albums, 1);
    }

    #[tokio::test]
    async fn test_mark_page_visited_inserts_missing_page() {
        let state = state().await;
        state.mark_page_visited(7).await.unwrap();
        let summary = state.summary().await.unwrap();
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.pages_visited, 1);
    }

    #[tokio::test]
    async fn test_album_visitation() {
        let state = state().await;
        state.insert_album_if_absent("https://e.com/album/a").await.unwrap();
        state.insert_album_if_absent("https://e.com/album/b").await.unwrap();
        state.mark_album_visited("https://e.com/album/a").await.unwrap();

        assert_eq!(
            state.unvisited_albums().await.unwrap(),
            vec!["https://e.com/album/b".to_string()]
        );
    }

    #[tokio::test]
    async fn test_song_lifecycle() {
        let state = state().await;
        let song = SongInfo::new("Album", "Track", "https://e.com/album/a/track.mp3");

        assert_eq!(state.record_songs(std::slice::from_ref(&song)).await.unwrap(), 1);
        assert_eq!(state.record_songs(std::slice::from_ref(&song)).await.unwrap(), 0);
        assert_eq!(state.pending_songs().await.unwrap(), vec![song.clone()]);

        let resolved = song.with_media_url("https://cdn.e.com/track.mp3");
        state.record_resolved_song(&resolved).await.unwrap();
        assert_eq!(state.pending_songs().await.unwrap(), vec![resolved.clone()]);

        state.mark_song_downloaded(&resolved).await.unwrap();
        assert!(state.pending_songs().await.unwrap().is_empty());

        let summary = state.summary().await.unwrap();
        assert_eq!(summary.songs, 1);
        assert_eq!(summary.songs_resolved, 1);
        assert_eq!(summary.songs_downloaded, 1);
    }

    #[tokio::test]
    async fn test_resolution_does_not_reopen_downloaded_song() {
        let state = state().await;
        let song = SongInfo::new("Album", "Track", "https://e.com/album/a/track.mp3");
        state.mark_song_downloaded(&song).await.unwrap();
        state
            .record_resolved_song(&song.with_media_url("https://cdn.e.com/t.mp3"))
            .await
            .unwrap();
        assert!(state.pending_songs().await.unwrap().is_empty());
    }
}
