//! In-process fakes for exercising tasks and the worker pool.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;

use super::{AlbumClaims, CatalogUrls, ListingPolicy, TaskContext};
use crate::db::Database;
use crate::download::Materializer;
use crate::model::SongInfo;
use crate::parser::{PageParser, ParseError, ParseExecutor};
use crate::state::CrawlState;
use crate::transport::{ByteStream, Page, Transport, TransportError};

pub(crate) const BASE: &str = "https://catalog.test/game-soundtracks";

/// Transport serving canned bodies, with scripted failures per URL.
#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    pages: Mutex<HashMap<String, String>>,
    media: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, (u32, u16)>>,
    requests: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub(crate) fn page(self, url: &str, body: &str) -> Self {
        self.pages.lock().unwrap().insert(url.to_string(), body.to_string());
        self
    }

    pub(crate) fn media(self, url: &str, data: &[u8]) -> Self {
        self.media.lock().unwrap().insert(url.to_string(), data.to_vec());
        self
    }

    /// The next `times` requests for `url` fail with `status`.
    pub(crate) fn fail(self, url: &str, times: u32, status: u16) -> Self {
        self.failures.lock().unwrap().insert(url.to_string(), (times, status));
        self
    }

    pub(crate) fn requests_for(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub(crate) fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn scripted_failure(&self, url: &str) -> Option<TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        let mut failures = self.failures.lock().unwrap();
        let (remaining, status) = failures.get_mut(url)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(TransportError::http_status(url, *status))
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str) -> Result<Page, TransportError> {
        if let Some(err) = self.scripted_failure(url) {
            return Err(err);
        }
        let body = self.pages.lock().unwrap().get(url).cloned();
        match body {
            Some(body) => Ok(Page {
                status: 200,
                body: Bytes::from(body),
            }),
            None => Err(TransportError::http_status(url, 404)),
        }
    }

    async fn get_stream(&self, url: &str) -> Result<ByteStream, TransportError> {
        if let Some(err) = self.scripted_failure(url) {
            return Err(err);
        }
        let data = self.media.lock().unwrap().get(url).cloned();
        match data {
            Some(data) => Ok(stream::iter([Ok(Bytes::from(data))]).boxed()),
            None => Err(TransportError::http_status(url, 404)),
        }
    }
}

/// Parser over a line-oriented fixture format:
///
/// ```text
/// pages 3
/// title Some Album
/// album https://...
/// song Track Name|https://...
/// media https://...
/// ```
#[derive(Debug, Default)]
pub(crate) struct LineParser;

fn values<'a>(body: &'a str, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    body.lines().filter_map(move |line| line.strip_prefix(key)?.strip_prefix(' '))
}

impl PageParser for LineParser {
    fn extract_page_count(&self, body: &str, page_url: &str) -> Result<u32, ParseError> {
        let value = values(body, "pages")
            .next()
            .ok_or_else(|| ParseError::missing("page count", page_url))?;
        value.parse().map_err(|_| ParseError::invalid("page count", value, page_url))
    }

    fn extract_album_links(&self, body: &str, _page_url: &str) -> Result<Vec<String>, ParseError> {
        Ok(values(body, "album").map(str::to_string).collect())
    }

    fn extract_song_records(
        &self,
        body: &str,
        album_url: &str,
    ) -> Result<Vec<SongInfo>, ParseError> {
        let album = values(body, "title")
            .next()
            .ok_or_else(|| ParseError::missing("album title", album_url))?;
        Ok(values(body, "song")
            .filter_map(|value| value.split_once('|'))
            .map(|(title, url)| SongInfo::new(album, title, url))
            .collect())
    }

    fn extract_direct_media_url(&self, body: &str, song_url: &str) -> Result<String, ParseError> {
        values(body, "media")
            .next()
            .map(str::to_string)
            .ok_or_else(|| ParseError::missing("media link", song_url))
    }
}

/// Builds a context over an in-memory store, downloading under `root`.
pub(crate) async fn context(
    transport: Arc<FakeTransport>,
    root: &Path,
    policy: ListingPolicy,
) -> (TaskContext, Arc<CrawlState>) {
    let state = Arc::new(CrawlState::new(Database::new_in_memory().await.unwrap()));
    state.initialize().await.unwrap();
    let ctx = TaskContext {
        transport,
        store: state.clone(),
        parser: ParseExecutor::new(Arc::new(LineParser), 2),
        materializer: Materializer::new(root.join("songs"), root.join("cache")),
        urls: CatalogUrls::parse(BASE).unwrap(),
        listing_policy: policy,
        album_claims: Arc::new(AlbumClaims::default()),
    };
    (ctx, state)
}
