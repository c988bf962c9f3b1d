//! HTML extraction for the soundtrack catalog layout.
//!
//! The catalog exposes three page kinds:
//! - listing pages (`<index>?page=N`) linking to albums and to other pages
//! - album pages with a `#songlist` table linking to per-song pages
//! - song pages linking to the direct media file

use std::collections::HashSet;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{PageParser, ParseError};
use crate::model::{SongInfo, extension_from_url};

/// Path fragment shared by every album URL on the catalog.
pub const DEFAULT_ALBUM_PATH_MARKER: &str = "/game-soundtracks/album/";

/// File extensions treated as direct media links on song pages.
const MEDIA_EXTENSIONS: [&str; 6] = [".mp3", ".flac", ".ogg", ".m4a", ".wav", ".opus"];

/// Title length kept in front of a ` (n)` suffix, short enough that path
/// truncation never cuts the suffix off.
const SUFFIXED_TITLE_CHARS: usize = 100;

/// [`PageParser`] for the catalog's HTML layout, built on `scraper`.
#[derive(Debug)]
pub struct CatalogParser {
    album_path_marker: String,
    links: Selector,
    album_title: Selector,
    song_table: Selector,
    song_links: Selector,
    audio_source: Selector,
    page_param: Regex,
}

impl CatalogParser {
    /// Creates a parser for the default catalog layout.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Selector`] if a built-in selector fails to compile.
    pub fn new() -> Result<Self, ParseError> {
        Self::with_album_path_marker(DEFAULT_ALBUM_PATH_MARKER)
    }

    /// Creates a parser that recognises album links by `marker` in their path.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Selector`] if a built-in selector fails to compile.
    pub fn with_album_path_marker(marker: impl Into<String>) -> Result<Self, ParseError> {
        Ok(Self {
            album_path_marker: marker.into(),
            links: selector("a[href]")?,
            album_title: selector("#pageContent h2, h2")?,
            song_table: selector("table#songlist")?,
            song_links: selector("#songlist td.clickable-row a[href]")?,
            audio_source: selector("audio[src], audio source[src]")?,
            page_param: Regex::new(r"[?&]page=(\d+)").map_err(|e| ParseError::Selector {
                selector: "page=".to_string(),
                reason: e.to_string(),
            })?,
        })
    }

    fn is_album_link(&self, url: &Url) -> bool {
        let path = url.path();
        path.contains(&self.album_path_marker) && path.len() > self.album_path_marker.len()
    }
}

impl PageParser for CatalogParser {
    fn extract_page_count(&self, body: &str, page_url: &str) -> Result<u32, ParseError> {
        let document = Html::parse_document(body);

        let mut last_page: Option<u32> = None;
        for anchor in document.select(&self.links) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            for capture in self.page_param.captures_iter(href) {
                let raw = &capture[1];
                let page = raw
                    .parse::<u32>()
                    .map_err(|_| ParseError::invalid("page number", raw, page_url))?;
                last_page = Some(last_page.map_or(page, |current| current.max(page)));
            }
        }

        match last_page {
            Some(0) => Err(ParseError::invalid("page number", "0", page_url)),
            Some(count) => Ok(count),
            // Unpaginated index: a single page, provided it lists albums at all.
            None if !self.extract_album_links(body, page_url)?.is_empty() => Ok(1),
            None => Err(ParseError::missing("pagination or album list", page_url)),
        }
    }

    fn extract_album_links(&self, body: &str, page_url: &str) -> Result<Vec<String>, ParseError> {
        let base = Url::parse(page_url)
            .map_err(|_| ParseError::invalid("page URL", page_url, page_url))?;
        let document = Html::parse_document(body);

        let mut seen = HashSet::new();
        let mut albums = Vec::new();
        for anchor in document.select(&self.links) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Ok(mut url) = base.join(href) else {
                continue;
            };
            url.set_fragment(None);
            if self.is_album_link(&url) && seen.insert(url.to_string()) {
                albums.push(url.to_string());
            }
        }
        Ok(albums)
    }

    fn extract_song_records(
        &self,
        body: &str,
        album_url: &str,
    ) -> Result<Vec<SongInfo>, ParseError> {
        let base = Url::parse(album_url)
            .map_err(|_| ParseError::invalid("album URL", album_url, album_url))?;
        let document = Html::parse_document(body);

        let album = document
            .select(&self.album_title)
            .map(element_text)
            .find(|text| !text.is_empty())
            .ok_or_else(|| ParseError::missing("album title", album_url))?;

        if document.select(&self.song_table).next().is_none() {
            return Err(ParseError::missing("song list", album_url));
        }

        let mut seen_urls = HashSet::new();
        let mut seen_paths = HashSet::new();
        let mut songs = Vec::new();
        // Every cell of a song row links to the same page; the first link carries the title.
        for anchor in document.select(&self.song_links) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Ok(url) = base.join(href) else {
                continue;
            };
            if !seen_urls.insert(url.to_string()) {
                continue;
            }

            let mut title = element_text(anchor);
            if title.is_empty() {
                title = format!("Track {}", songs.len() + 1);
            }

            // Titles differing only in case or reserved characters share a
            // sanitized file name; number them until the path is unique.
            let mut song = SongInfo::new(album.clone(), title.clone(), url.to_string());
            let stem: String = title.chars().take(SUFFIXED_TITLE_CHARS).collect();
            let mut suffix = 2;
            while !seen_paths.insert(song.path_key().to_lowercase()) {
                song = SongInfo::new(album.clone(), format!("{stem} ({suffix})"), url.to_string());
                suffix += 1;
            }
            songs.push(song);
        }

        Ok(songs)
    }

    fn extract_direct_media_url(&self, body: &str, song_url: &str) -> Result<String, ParseError> {
        let base = Url::parse(song_url)
            .map_err(|_| ParseError::invalid("song URL", song_url, song_url))?;
        let document = Html::parse_document(body);

        let from_anchor = document
            .select(&self.links)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter_map(|href| base.join(href).ok())
            .find(|url| {
                // Song pages link to sibling song pages, which share the media extension.
                extension_from_url(url.as_str())
                    .is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
                    && !self.is_album_link(url)
            });

        let media = from_anchor.or_else(|| {
            document
                .select(&self.audio_source)
                .filter_map(|element| element.value().attr("src"))
                .find_map(|src| base.join(src).ok())
        });

        media
            .map(String::from)
            .ok_or_else(|| ParseError::missing("media link", song_url))
    }
}

fn selector(source: &str) -> Result<Selector, ParseError> {
    Selector::parse(source).map_err(|e| ParseError::Selector {
        selector: source.to_string(),
        reason: e.to_string(),
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
