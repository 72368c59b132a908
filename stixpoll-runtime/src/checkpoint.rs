//! Poll state and its checkpoint file

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a source remembers between runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollState {
    /// Newest content timestamp delivered so far, epoch milliseconds
    pub watermark: Option<i64>,
}

impl PollState {
    pub fn new(watermark: Option<i64>) -> Self {
        Self { watermark }
    }

    /// Move the watermark forward to `observed`; never moves it back
    pub fn advance(self, observed: Option<i64>) -> Self {
        Self {
            watermark: self.watermark.max(observed),
        }
    }
}

/// Read the checkpoint; a missing file means the source never synced
pub async fn load(path: &Path) -> Result<PollState, CheckpointError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No checkpoint at {}", path.display());
            Ok(PollState::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Write the checkpoint through a temporary file so a crash never leaves a
/// truncated one behind
pub async fn save(path: &Path, state: &PollState) -> Result<(), CheckpointError> {
    let tmp = temp_path(path);
    let content = serde_json::to_string_pretty(state)?;
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!("Saved checkpoint {:?} to {}", state.watermark, path.display());
    Ok(())
}

/// Forget the stored state
pub async fn reset(path: &Path) -> Result<(), CheckpointError> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_monotonic() {
        let state = PollState::new(Some(100));
        assert_eq!(state.advance(Some(200)).watermark, Some(200));
        assert_eq!(state.advance(Some(50)).watermark, Some(100));
        assert_eq!(state.advance(None).watermark, Some(100));
        assert_eq!(PollState::default().advance(None).watermark, None);
    }

    #[tokio::test]
    async fn test_missing_file_is_never_synced() {
        let dir = tempfile::tempdir().unwrap();
        let state = load(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(state, PollState::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");

        save(&path, &PollState::new(Some(1509970339000))).await.unwrap();
        assert!(!temp_path(&path).exists());
        assert_eq!(load(&path).await.unwrap().watermark, Some(1509970339000));

        reset(&path).await.unwrap();
        assert!(!path.exists());
        reset(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(load(&path).await, Err(CheckpointError::Json(_))));
    }
}
