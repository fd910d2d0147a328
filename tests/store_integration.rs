//! Integration tests for on-disk state: history, metadata, session, and lock.

use archiver_core::backend::VideoMetadata;
use archiver_core::config::IdentityConfig;
use archiver_core::identity::IdentityRotator;
use archiver_core::store::{HistoryRepository, JsonHistoryStore, StateLock, StoreError};
use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
use tempfile::TempDir;

/// History and metadata survive a reopen, and the history file stays a
/// plain JSON array of ids.
#[tokio::test]
async fn test_history_persists_across_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let history = dir.path().join("download_history.json");
    let metadata = dir.path().join("favorite_video_metadata.json");

    let mut store = JsonHistoryStore::open(&history, &metadata)?;
    assert!(store.is_empty());
    let mut video = VideoMetadata::with_id("7301").filesize(2048);
    video.title = Some("cat".to_string());
    video.tags = vec!["pets".to_string()];
    assert!(store.add(video));
    assert!(store.add(VideoMetadata::with_id("7302")));
    store.save().await?;

    let ids: Vec<String> = serde_json::from_str(&std::fs::read_to_string(&history)?)?;
    assert_eq!(ids, vec!["7301", "7302"]);

    let reopened = JsonHistoryStore::open(&history, &metadata)?;
    assert_eq!(reopened.len(), 2);
    assert!(reopened.contains("7301"));
    let stored = reopened.metadata("7301").ok_or("metadata missing")?;
    assert_eq!(stored.title.as_deref(), Some("cat"));
    assert_eq!(stored.filesize, 2048);
    assert_eq!(stored.tags, vec!["pets"]);
    Ok(())
}

/// Saving leaves no temporary files next to the state files.
#[tokio::test]
async fn test_save_leaves_only_state_files() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let history = dir.path().join("download_history.json");
    let metadata = dir.path().join("liked_video_metadata.json");

    let mut store = JsonHistoryStore::open(&history, &metadata)?;
    store.add(VideoMetadata::with_id("1"));
    store.save().await?;
    store.add(VideoMetadata::with_id("2"));
    store.save().await?;

    let mut names: Vec<String> = std::fs::read_dir(dir.path())?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    names.sort();
    assert_eq!(names, vec!["download_history.json", "liked_video_metadata.json"]);
    Ok(())
}

/// A corrupt history file is refused instead of being overwritten.
#[test]
fn test_corrupt_history_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let history = dir.path().join("download_history.json");
    std::fs::write(&history, "[\"1\", ")?;

    let result = JsonHistoryStore::open(&history, &dir.path().join("meta.json"));

    assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    assert_eq!(std::fs::read_to_string(&history)?, "[\"1\", ");
    Ok(())
}

/// A second run against the same state directory is turned away.
#[test]
fn test_state_lock_is_exclusive() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;

    let held = StateLock::acquire(dir.path())?;
    assert!(matches!(
        StateLock::acquire(dir.path()),
        Err(StoreError::Locked { .. })
    ));

    drop(held);
    StateLock::acquire(dir.path())?;
    Ok(())
}

/// Rotated user agent and absorbed cookies are restored by the next run.
#[test]
fn test_identity_session_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let session = dir.path().join("session_data.json");
    let config = IdentityConfig {
        user_agents: vec!["UA-A".to_string(), "UA-B".to_string()],
        ..IdentityConfig::default()
    };

    let mut rotator = IdentityRotator::load(&config, &session, None);
    assert_eq!(rotator.current().user_agent, "UA-A");
    rotator.rotate()?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, HeaderValue::from_static("ttwid=abc; Path=/; HttpOnly"));
    assert!(rotator.absorb(&headers)?);

    let restored = IdentityRotator::load(&config, &session, None);
    assert_eq!(restored.current().user_agent, "UA-B");
    assert_eq!(
        restored.current().cookies.get("ttwid").map(String::as_str),
        Some("abc")
    );
    assert_eq!(restored.rotations(), 0);
    Ok(())
}
