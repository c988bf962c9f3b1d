//! Song metadata and deterministic on-disk naming.
//!
//! A song's relative path is derived only from its album and track titles,
//! so the same song maps to the same file on every run. That stability is
//! what lets a re-crawl skip songs whose destination already exists.

use std::fmt;
use std::path::PathBuf;

use url::Url;

/// Extension used when neither the detail nor the media URL carries one.
pub const DEFAULT_EXTENSION: &str = ".mp3";

/// Longest sanitized path component, in characters.
const MAX_COMPONENT_CHARS: usize = 120;

/// Where a song's bytes can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongUrl {
    /// The song's detail page; the media link has not been extracted yet.
    Detail(String),
    /// The direct media file.
    Media(String),
}

impl SongUrl {
    /// Returns the URL string regardless of resolution state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Detail(url) | Self::Media(url) => url,
        }
    }

    /// Returns `true` once the direct media URL is known.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Media(_))
    }
}

impl fmt::Display for SongUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One song discovered on an album page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongInfo {
    /// Album title as shown on the album page.
    pub album: String,
    /// Track title as shown in the album's song list.
    pub title: String,
    /// Path relative to the songs (and cache) root.
    pub file_path: PathBuf,
    /// Detail-page or direct media URL.
    pub url: SongUrl,
}

impl SongInfo {
    /// Builds an unresolved song whose file path is derived from album and title.
    ///
    /// The extension is taken from the detail URL's last path segment when it
    /// has one, otherwise [`DEFAULT_EXTENSION`] is used.
    #[must_use]
    pub fn new(
        album: impl Into<String>,
        title: impl Into<String>,
        detail_url: impl Into<String>,
    ) -> Self {
        let album = album.into();
        let title = title.into();
        let detail_url = detail_url.into();
        let extension =
            extension_from_url(&detail_url).unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        let file_path = song_relative_path(&album, &title, &extension);
        Self {
            album,
            title,
            file_path,
            url: SongUrl::Detail(detail_url),
        }
    }

    /// Returns a copy carrying the resolved media URL; the file path is unchanged.
    #[must_use]
    pub fn with_media_url(&self, media_url: impl Into<String>) -> Self {
        Self {
            url: SongUrl::Media(media_url.into()),
            ..self.clone()
        }
    }

    /// Returns the relative path as a `/`-joined string, used as the store key.
    #[must_use]
    pub fn path_key(&self) -> String {
        self.file_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for SongInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.album, self.title)
    }
}

/// Derives `<sanitized album>/<sanitized track><ext>`.
///
/// The extension is only appended when the title does not already end with it.
#[must_use]
pub fn song_relative_path(album: &str, title: &str, extension: &str) -> PathBuf {
    let album_dir = sanitize_path_component(album);
    let mut file_name = sanitize_path_component(title);
    if !file_name.to_lowercase().ends_with(&extension.to_lowercase()) {
        file_name.push_str(extension);
    }
    PathBuf::from(album_dir).join(file_name)
}

/// Makes one path component safe on common filesystems.
///
/// Reserved characters and control characters become `_` (runs collapse to
/// one), leading/trailing dots and spaces are dropped, and empty or
/// dot-only results become `untitled`.
#[must_use]
pub fn sanitize_path_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c if c.is_whitespace() => ' ',
            c => c,
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }

    let trimmed: String = out
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .chars()
        .take(MAX_COMPONENT_CHARS)
        .collect();
    let trimmed = trimmed.trim_end().to_string();

    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        "untitled".to_string()
    } else {
        trimmed
    }
}

/// Extracts a lowercase `.ext` from the last URL path segment, percent-decoded.
#[must_use]
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(last_segment).ok()?;
    let dot_index = decoded.rfind('.')?;
    let ext = &decoded[dot_index..];
    if ext.len() <= 1 || ext.len() > 6 || !ext[1..].chars().all(char::is_alphanumeric) {
        return None;
    }
    Some(ext.to_lowercase())
}
