//! Integration tests for the crawl state store on a real SQLite file.

use std::sync::Arc;

use crawler_core::{CrawlState, CrawlStateStore, Database, SongInfo};
use tempfile::TempDir;

async fn open_state(temp: &TempDir) -> Result<CrawlState, Box<dyn std::error::Error>> {
    let db = Database::new(&temp.path().join("crawl.db")).await?;
    let state = CrawlState::new(db);
    state.initialize().await?;
    Ok(state)
}

#[tokio::test]
async fn test_initialize_twice_keeps_progress() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let state = open_state(&temp).await?;
    state.record_page_count(3).await?;
    state.mark_page_visited(2).await?;

    let reopened = open_state(&temp).await?;
    assert!(reopened.page_count_known().await?);
    assert_eq!(reopened.unvisited_pages().await?, vec![3]);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_album_discovery_inserts_once() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let state: Arc<dyn CrawlStateStore> = Arc::new(open_state(&temp).await?);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let state = Arc::clone(&state);
        handles.push(tokio::spawn(async move {
            state.insert_album_if_absent("https://e.com/game-soundtracks/album/ys").await
        }));
    }

    let mut newly_inserted = 0;
    for handle in handles {
        if handle.await?? {
            newly_inserted += 1;
        }
    }

    assert_eq!(newly_inserted, 1);
    assert_eq!(state.summary().await?.albums, 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_page_visits_all_recorded() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let state = Arc::new(open_state(&temp).await?);
    state.record_page_count(20).await?;

    let mut handles = Vec::new();
    for page in 2..=20 {
        let state = Arc::clone(&state);
        handles.push(tokio::spawn(async move { state.mark_page_visited(page).await }));
    }
    for handle in handles {
        handle.await??;
    }

    assert!(state.unvisited_pages().await?.is_empty());
    let summary = state.summary().await?;
    assert_eq!((summary.pages, summary.pages_visited), (20, 20));
    Ok(())
}

#[tokio::test]
async fn test_pending_songs_resume_with_resolved_url() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let state = open_state(&temp).await?;
    let opening = SongInfo::new("Ys", "Opening", "https://e.com/album/ys/01.mp3");
    let field = SongInfo::new("Ys", "Field", "https://e.com/album/ys/02.mp3");
    state.record_songs(&[opening.clone(), field.clone()]).await?;
    state.record_resolved_song(&field.with_media_url("https://cdn.e.com/ys/02.mp3")).await?;
    state.mark_song_downloaded(&opening).await?;
    drop(state);

    let reopened = open_state(&temp).await?;
    let pending = reopened.pending_songs().await?;

    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].file_path, field.file_path);
    assert!(pending[0].url.is_resolved());
    assert_eq!(pending[0].url.as_str(), "https://cdn.e.com/ys/02.mp3");
    Ok(())
}
