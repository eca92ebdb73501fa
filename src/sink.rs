//! Durable run sink. One directory per run holding the accepted and
//! rejected JSONL streams plus a one-shot manifest.
//!
//! Appends are durable the moment they return; an aborted run keeps
//! whatever was already written and simply never gets a manifest.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::SinkError;
use crate::records::{QaRecord, RejectedRecord, RunManifest};

/// Writer for a single run's output directory.
#[derive(Debug)]
pub struct RunSink {
    run_id: String,
    run_dir: PathBuf,
}

impl RunSink {
    /// Create `<output_root>/<run_id>/` where the run id is a UTC
    /// timestamp token derived from the start time.
    pub async fn create(
        output_root: &Path,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SinkError> {
        let run_id = started_at.format("%Y%m%dT%H%M%SZ").to_string();
        let run_dir = output_root.join(&run_id);
        fs::create_dir_all(&run_dir).await?;
        Ok(Self { run_id, run_dir })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub async fn append_accepted(&self, record: &QaRecord) -> Result<(), SinkError> {
        append_jsonl(&self.run_dir.join("accepted.jsonl"), record).await
    }

    pub async fn append_rejected(&self, record: &RejectedRecord) -> Result<(), SinkError> {
        append_jsonl(&self.run_dir.join("rejected.jsonl"), record).await
    }

    /// Write the manifest. Called exactly once, at the end of a run.
    pub async fn write_manifest(&self, manifest: &RunManifest) -> Result<(), SinkError> {
        let body = serde_json::to_string_pretty(manifest)?;
        fs::write(self.run_dir.join("manifest.json"), body).await?;
        Ok(())
    }
}

/// Append one record as a single JSON line.
async fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<(), SinkError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}
