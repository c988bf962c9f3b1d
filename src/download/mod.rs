//! Song materialization: stage the media stream, then publish atomically.
//!
//! The destination path doubles as the completion marker. Bytes are only
//! ever written under the cache (staging) root; a file appears under the
//! songs root solely through a rename of a fully written staging file.
//!
//! # Example
//!
//! ```no_run
//! use crawler_core::download::{MaterializeOutcome, Materializer};
//! use crawler_core::model::SongInfo;
//! use crawler_core::transport::HttpTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new()?;
//! let materializer = Materializer::new("songs", ".songcache");
//! let song = SongInfo::new("Album", "Track", "https://example.com/album/a/track.mp3")
//!     .with_media_url("https://cdn.example.com/a/track.mp3");
//! match materializer.download(&song, &transport).await? {
//!     MaterializeOutcome::Downloaded { path, bytes } => {
//!         println!("{bytes} bytes -> {}", path.display());
//!     }
//!     MaterializeOutcome::Skipped { path } => println!("already have {}", path.display()),
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod materializer;

pub use error::DownloadError;
pub use materializer::{DOWNLOAD_CHUNK_SIZE, DownloadStats, MaterializeOutcome, Materializer};
