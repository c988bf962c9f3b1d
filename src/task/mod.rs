//! Fetch tasks: the unit of work moved through the queue.
//!
//! A [`FetchTask`] is an immutable value owning exactly the data it needs for
//! its network call. Executing it performs one attempt and returns the child
//! tasks its success produced:
//!
//! | Task | Fetches | Side effects | Children |
//! |---|---|---|---|
//! | `ListingPage(n)` | page `n` | albums inserted, page visited | unvisited albums [^f] |
//! | `Album(url)` | album page | songs recorded, album visited | one `Song` per track |
//! | `Song` (detail URL) | song page | media URL recorded | the same `Song`, resolved |
//! | `Song` (media URL) | media stream | file published, song downloaded | none |
//!
//! [^f]: Only when following albums, and only albums not already queued
//! this run.
//!
//! Splitting song resolution from transfer means a failed transfer retries
//! only the transfer.

mod context;
mod error;
#[cfg(test)]
pub(crate) mod testing;

pub use context::{AlbumClaims, CatalogUrls, ListingPolicy, TaskContext};
pub use error::TaskError;

use std::fmt;

use tracing::{debug, instrument};

use crate::download::MaterializeOutcome;
use crate::model::{SongInfo, SongUrl};

/// One unit of crawl work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTask {
    /// Read one page of the catalog index.
    ListingPage(u32),
    /// Enumerate the songs of one album.
    Album(String),
    /// Resolve or download one song, depending on its URL.
    Song(SongInfo),
}

impl fmt::Display for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListingPage(page) => write!(f, "listing page {page}"),
            Self::Album(url) => write!(f, "album {url}"),
            Self::Song(song) if song.url.is_resolved() => write!(f, "download '{song}'"),
            Self::Song(song) => write!(f, "resolve '{song}'"),
        }
    }
}

impl FetchTask {
    /// Performs one attempt of this task, returning the follow-up tasks.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] describing the failed step; state written
    /// before the failure is idempotent, so the attempt can be repeated.
    #[instrument(skip(self, ctx), fields(task = %self))]
    pub async fn execute(&self, ctx: &TaskContext) -> Result<Vec<FetchTask>, TaskError> {
        match self {
            Self::ListingPage(page) => fetch_listing_page(*page, ctx).await,
            Self::Album(url) => fetch_album(url, ctx).await,
            Self::Song(song) => match &song.url {
                SongUrl::Detail(url) => resolve_song(song, url, ctx).await,
                SongUrl::Media(_) => download_song(song, ctx).await,
            },
        }
    }
}

async fn fetch_listing_page(page: u32, ctx: &TaskContext) -> Result<Vec<FetchTask>, TaskError> {
    let url = ctx.urls.listing_page(page);
    let body = ctx.transport.get(&url).await?.text();
    let links = ctx.parser.album_links(body, url).await?;
    let follow = ctx.listing_policy == ListingPolicy::FollowAlbums;

    let mut unvisited = Vec::new();
    for link in links {
        let inserted = ctx.store.insert_album_if_absent(&link).await?;
        if follow && (inserted || !ctx.store.is_album_visited(&link).await?) {
            unvisited.push(link);
        }
    }
    ctx.store.mark_page_visited(page).await?;

    // Claimed only after the page is recorded; a failed attempt leaves its
    // albums claimable by the retry.
    let children: Vec<FetchTask> = unvisited
        .into_iter()
        .filter(|link| ctx.album_claims.claim(link))
        .map(FetchTask::Album)
        .collect();

    debug!(page, chained_albums = children.len(), "listing page recorded");
    Ok(children)
}

async fn fetch_album(url: &str, ctx: &TaskContext) -> Result<Vec<FetchTask>, TaskError> {
    let body = ctx.transport.get(url).await?.text();
    let songs = ctx.parser.song_records(body, url.to_string()).await?;

    let inserted = ctx.store.record_songs(&songs).await?;
    ctx.store.mark_album_visited(url).await?;

    debug!(songs = songs.len(), inserted, "album recorded");
    Ok(songs.into_iter().map(FetchTask::Song).collect())
}

async fn resolve_song(
    song: &SongInfo,
    url: &str,
    ctx: &TaskContext,
) -> Result<Vec<FetchTask>, TaskError> {
    let body = ctx.transport.get(url).await?.text();
    let media_url = ctx.parser.media_url(body, url.to_string()).await?;

    let resolved = song.with_media_url(media_url);
    ctx.store.record_resolved_song(&resolved).await?;

    Ok(vec![FetchTask::Song(resolved)])
}

async fn download_song(song: &SongInfo, ctx: &TaskContext) -> Result<Vec<FetchTask>, TaskError> {
    let outcome = ctx.materializer.download(song, ctx.transport.as_ref()).await?;
    ctx.store.mark_song_downloaded(song).await?;

    if let MaterializeOutcome::Skipped { path } = outcome {
        debug!(path = %path.display(), "song already present");
    }
    Ok(Vec::new())
}
