//! Shared collaborators handed to every task execution.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use url::Url;

use crate::download::Materializer;
use crate::parser::ParseExecutor;
use crate::state::CrawlStateStore;
use crate::transport::Transport;

/// What a listing page does with the albums it discovers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListingPolicy {
    /// Only record albums in the store.
    RecordOnly,
    /// Record albums and chain an album fetch for each one still unvisited.
    #[default]
    FollowAlbums,
}

/// Builds catalog index URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogUrls {
    base: Url,
}

impl CatalogUrls {
    /// Parses the catalog index root, e.g. `https://host/game-soundtracks`.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if `base` is not an absolute URL.
    pub fn parse(base: &str) -> Result<Self, url::ParseError> {
        Ok(Self { base: Url::parse(base)? })
    }

    /// The unpaginated index root.
    #[must_use]
    pub fn index_root(&self) -> &str {
        self.base.as_str()
    }

    /// URL of listing page `page`.
    #[must_use]
    pub fn listing_page(&self, page: u32) -> String {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("page", &page.to_string());
        url.into()
    }
}

/// Albums already queued during the current run.
///
/// A listing page chains an unvisited album only if it wins the claim, so an
/// album listed on several pages, or also seeded from the store, is fetched
/// once per run.
#[derive(Debug, Default)]
pub struct AlbumClaims {
    claimed: Mutex<HashSet<String>>,
}

impl AlbumClaims {
    /// Returns `true` the first time `album_url` is claimed.
    pub fn claim(&self, album_url: &str) -> bool {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if claimed.contains(album_url) {
            return false;
        }
        claimed.insert(album_url.to_string())
    }
}

/// Everything a task needs to run one attempt.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Network access.
    pub transport: Arc<dyn Transport>,
    /// Durable progress.
    pub store: Arc<dyn CrawlStateStore>,
    /// Bounded parse pool.
    pub parser: ParseExecutor,
    /// Song stage-then-publish.
    pub materializer: Materializer,
    /// Index URL builder.
    pub urls: CatalogUrls,
    /// Album chaining for listing pages.
    pub listing_policy: ListingPolicy,
    /// Albums queued so far in this run.
    pub album_claims: Arc<AlbumClaims>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_page_url() {
        let urls = CatalogUrls::parse("https://downloads.example.com/game-soundtracks").unwrap();
        assert_eq!(urls.listing_page(7), "https://downloads.example.com/game-soundtracks?page=7");
        assert_eq!(urls.index_root(), "https://downloads.example.com/game-soundtracks");
    }

    #[test]
    fn test_listing_page_url_keeps_existing_query() {
        let urls = CatalogUrls::parse("https://e.com/list?sort=name").unwrap();
        assert_eq!(urls.listing_page(2), "https://e.com/list?sort=name&page=2");
    }

    #[test]
    fn test_relative_base_rejected() {
        assert!(CatalogUrls::parse("game-soundtracks").is_err());
    }

    #[test]
    fn test_album_claimed_once() {
        let claims = AlbumClaims::default();
        assert!(claims.claim("https://e.com/album/a"));
        assert!(!claims.claim("https://e.com/album/a"));
        assert!(claims.claim("https://e.com/album/b"));
    }

    #[test]
    fn test_default_policy_follows_albums() {
        assert_eq!(ListingPolicy::default(), ListingPolicy::FollowAlbums);
    }
}
