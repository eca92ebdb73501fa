//! Durable resume cursor. One JSON file per output root recording the
//! most recently processed message's sent time and id.
//!
//! The file is schema-strict: unknown fields fail the load instead of
//! being ignored, because silently trusting a checkpoint of the wrong
//! shape risks skipping real data.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::CheckpointError;

/// High-water mark of the most recently processed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub last_sent_at: DateTime<Utc>,
    pub last_message_id: String,
}

/// On-disk shape. Timestamps are kept as strings so naive values can
/// be assumed UTC on load rather than failing to parse.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredCheckpoint {
    last_sent_at: String,
    last_message_id: String,
}

/// Loads, writes, and resets the checkpoint file under an output root.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(output_root: impl AsRef<Path>) -> Self {
        Self {
            path: output_root.as_ref().join("checkpoint.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored checkpoint. An absent file is `None`, not an
    /// error; anything unparsable is `CheckpointError::Corrupt`.
    pub async fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredCheckpoint =
            serde_json::from_str(&raw).map_err(|e| CheckpointError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        let last_sent_at =
            parse_utc(&stored.last_sent_at).ok_or_else(|| CheckpointError::Corrupt {
                path: self.path.clone(),
                reason: format!("unparsable last_sent_at: {}", stored.last_sent_at),
            })?;

        Ok(Some(Checkpoint {
            last_sent_at,
            last_message_id: stored.last_message_id,
        }))
    }

    /// Overwrite the checkpoint. Parent directories are created as
    /// needed; the content lands via a temp file and rename so no
    /// partially written state is ever visible.
    pub async fn write(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let stored = StoredCheckpoint {
            last_sent_at: checkpoint.last_sent_at.to_rfc3339(),
            last_message_id: checkpoint.last_message_id.clone(),
        };
        let body = serde_json::to_string_pretty(&stored).map_err(|e| CheckpointError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Delete the checkpoint file. Idempotent; reports whether a file
    /// actually existed.
    pub async fn reset(&self) -> Result<bool, CheckpointError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Parse a stored timestamp, normalizing to UTC. Offset timestamps are
/// converted; naive ones are assumed UTC.
fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    value
        .parse::<NaiveDateTime>()
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn checkpoint() -> Checkpoint {
        Checkpoint {
            last_sent_at: Utc.with_ymd_and_hms(2026, 2, 1, 10, 30, 0).unwrap(),
            last_message_id: "abc-123".into(),
        }
    }

    #[tokio::test]
    async fn write_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        store.write(&checkpoint()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded, checkpoint());
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("a/b/c"));
        store.write(&checkpoint()).await.unwrap();
        assert!(store.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn naive_timestamp_is_assumed_utc() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let body = r#"{"last_sent_at": "2026-02-01T10:30:00", "last_message_id": "m1"}"#;
        fs::write(store.path(), body).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(
            loaded.last_sent_at,
            Utc.with_ymd_and_hms(2026, 2, 1, 10, 30, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn offset_timestamp_is_converted_to_utc() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let body = r#"{"last_sent_at": "2026-02-01T12:30:00+02:00", "last_message_id": "m1"}"#;
        fs::write(store.path(), body).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(
            loaded.last_sent_at,
            Utc.with_ymd_and_hms(2026, 2, 1, 10, 30, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn unknown_field_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let body = r#"{"last_sent_at": "2026-02-01T10:30:00Z", "last_message_id": "m1", "extra": 1}"#;
        fs::write(store.path(), body).await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        fs::write(store.path(), "not json").await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn reset_deletes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.write(&checkpoint()).await.unwrap();

        assert!(store.reset().await.unwrap());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_on_missing_file_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(!store.reset().await.unwrap());
    }
}
