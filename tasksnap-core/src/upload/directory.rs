//! Local directory screenshot store
//!
//! Mirrors a task's screenshot record on disk as
//! `<root>/<task_id>/<uploaded_at_millis>-<n>.png`.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::debug;

use super::{ScreenshotStore, UploadAck};
use crate::error::{Result, ResultExt, SnapError};
use crate::types::{unix_millis, TaskId};

/// Store writing PNG files under a root directory
pub struct DirectoryScreenshotStore {
    root: PathBuf,
    counter: AtomicU64,
}

impl DirectoryScreenshotStore {
    /// Store writing under `root`, created on first append
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one task's screenshots
    pub fn task_dir(&self, task_id: &TaskId) -> PathBuf {
        self.root.join(task_id.as_str())
    }
}

#[async_trait]
impl ScreenshotStore for DirectoryScreenshotStore {
    async fn append(&self, task_id: &TaskId, png: Bytes) -> Result<UploadAck> {
        let dir = self.task_dir(task_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(SnapError::from)
            .context(format!("Creating {}", dir.display()))?;

        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("{}-{}.png", unix_millis(SystemTime::now()), n));

        // Write to a temp name first so readers never see a partial file
        let tmp = path.with_extension("png.part");
        tokio::fs::write(&tmp, &png)
            .await
            .map_err(SnapError::from)
            .context(format!("Writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(SnapError::from)
            .context(format!("Renaming {}", tmp.display()))?;

        debug!("Stored screenshot at {}", path.display());

        Ok(UploadAck {
            task_id: task_id.clone(),
            bytes: png.len(),
            location: Some(path.display().to_string()),
        })
    }
}
