//! Stage-then-publish download of one song.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};

use super::DownloadError;
use crate::model::{SongInfo, SongUrl};
use crate::transport::{ByteStream, Transport};

/// Size of the write buffer; the staging file is written in blocks of this size.
pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Result of a successful materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// The song was transferred and published.
    Downloaded {
        /// Final destination.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
    },
    /// The destination already existed; nothing was fetched.
    Skipped {
        /// Existing destination.
        path: PathBuf,
    },
}

/// Download counters, shared across workers.
#[derive(Debug, Default)]
pub struct DownloadStats {
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    bytes: AtomicU64,
}

impl DownloadStats {
    /// Returns the number of songs transferred.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Returns the number of songs skipped because they already existed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Returns the total bytes published.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    fn record(&self, outcome: &MaterializeOutcome) {
        match outcome {
            MaterializeOutcome::Downloaded { bytes, .. } => {
                self.downloaded.fetch_add(1, Ordering::SeqCst);
                self.bytes.fetch_add(*bytes, Ordering::SeqCst);
            }
            MaterializeOutcome::Skipped { .. } => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

/// Turns a resolved song into a complete file under the songs root.
#[derive(Debug, Clone)]
pub struct Materializer {
    songs_dir: PathBuf,
    cache_dir: PathBuf,
    stats: Arc<DownloadStats>,
}

impl Materializer {
    /// Creates a materializer publishing into `songs_dir`, staging under `cache_dir`.
    #[must_use]
    pub fn new(songs_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            songs_dir: songs_dir.into(),
            cache_dir: cache_dir.into(),
            stats: Arc::new(DownloadStats::default()),
        }
    }

    /// Returns `<songs root>/<song path>`.
    #[must_use]
    pub fn destination(&self, song: &SongInfo) -> PathBuf {
        self.songs_dir.join(&song.file_path)
    }

    /// Returns `<cache root>/<song path>`.
    #[must_use]
    pub fn staging_path(&self, song: &SongInfo) -> PathBuf {
        self.cache_dir.join(&song.file_path)
    }

    /// Returns the counters shared by all clones of this materializer.
    #[must_use]
    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    /// Downloads `song` unless its destination already exists.
    ///
    /// The body is streamed to the staging path (truncating any leftover
    /// partial file) and renamed into place only after the stream ends and the
    /// buffer is flushed. On failure the staging file is left as is and the
    /// destination is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Unresolved`] for a song without a media URL,
    /// [`DownloadError::Transport`] if the stream fails, or
    /// [`DownloadError::Io`] if staging or publishing fails.
    #[instrument(skip(self, song, transport), fields(song = %song))]
    pub async fn download(
        &self,
        song: &SongInfo,
        transport: &dyn Transport,
    ) -> Result<MaterializeOutcome, DownloadError> {
        let SongUrl::Media(media_url) = &song.url else {
            return Err(DownloadError::Unresolved { song: song.to_string() });
        };

        let destination = self.destination(song);
        if tokio::fs::try_exists(&destination)
            .await
            .map_err(|e| DownloadError::io(&destination, e))?
        {
            debug!(path = %destination.display(), "already exists");
            let outcome = MaterializeOutcome::Skipped { path: destination };
            self.stats.record(&outcome);
            return Ok(outcome);
        }

        let staging = self.staging_path(song);
        ensure_parent(&staging).await?;

        info!(url = %media_url, "fetching song");
        let stream = transport.get_stream(media_url).await?;
        let mut file = File::create(&staging)
            .await
            .map_err(|e| DownloadError::io(&staging, e))?;
        let bytes = stream_to_file(&mut file, stream, &staging).await?;
        drop(file);

        ensure_parent(&destination).await?;
        tokio::fs::rename(&staging, &destination)
            .await
            .map_err(|e| DownloadError::io(&destination, e))?;

        info!(path = %destination.display(), bytes, "downloaded");
        let outcome = MaterializeOutcome::Downloaded {
            path: destination,
            bytes,
        };
        self.stats.record(&outcome);
        Ok(outcome)
    }
}

async fn ensure_parent(path: &Path) -> Result<(), DownloadError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }
    Ok(())
}

/// Streams chunks into `file`, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    mut stream: ByteStream,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
