//! Screenshot upload
//!
//! The dispatcher takes captured frames off the sampler channel and hands
//! each one to a [`ScreenshotStore`] in its own task. Uploads are fire and
//! forget: a slow or failed upload never holds up sampling, failures are
//! logged and counted but never retried.

mod directory;
mod http;

pub use directory::DirectoryScreenshotStore;
pub use http::HttpScreenshotStore;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::error::{Result, SnapError};
use crate::types::{CapturedFrame, TaskId};

/// Acknowledgement for one appended screenshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAck {
    /// Task the screenshot was appended to
    pub task_id: TaskId,
    /// Size of the stored image
    pub bytes: usize,
    /// Where the store put it, if it says
    pub location: Option<String>,
}

/// Remote (or local) owner of a task's screenshot record
///
/// `append` either stores the whole image or fails; there is no partial
/// success.
#[async_trait]
pub trait ScreenshotStore: Send + Sync {
    /// Append one PNG to the task's screenshot sequence
    async fn append(&self, task_id: &TaskId, png: Bytes) -> Result<UploadAck>;
}

/// Build the store described by the upload config
///
/// A server URL takes precedence over an output directory.
pub fn store_from_config(config: &UploadConfig) -> Result<Arc<dyn ScreenshotStore>> {
    if let Some(url) = &config.server_url {
        let store = HttpScreenshotStore::new(url)
            .with_upload_path(config.upload_path.clone())
            .with_api_key(config.api_key.clone());
        return Ok(Arc::new(store));
    }
    if let Some(dir) = &config.output_dir {
        return Ok(Arc::new(DirectoryScreenshotStore::new(dir.clone())));
    }
    Err(SnapError::config(
        "No upload destination: set server_url or output_dir",
    ))
}

/// Upload counters shared with the session
#[derive(Debug, Default)]
pub struct UploadStats {
    uploaded: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
}

impl UploadStats {
    /// Successful uploads
    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    /// Failed uploads
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Uploads started but not finished
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

/// Sends captured frames to a screenshot store
#[derive(Clone)]
pub struct UploadDispatcher {
    store: Arc<dyn ScreenshotStore>,
    stats: Arc<UploadStats>,
}

impl UploadDispatcher {
    /// Create a dispatcher over a store
    pub fn new(store: Arc<dyn ScreenshotStore>) -> Self {
        Self {
            store,
            stats: Arc::new(UploadStats::default()),
        }
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<UploadStats> {
        self.stats.clone()
    }

    /// Upload a single frame
    ///
    /// Failures are logged and counted here; the caller may ignore the
    /// returned error.
    pub async fn upload(&self, frame: CapturedFrame) -> Result<UploadAck> {
        self.stats.in_flight.fetch_add(1, Ordering::Relaxed);
        let result = self.store.append(&frame.task_id, frame.png).await;
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);

        match &result {
            Ok(ack) => {
                self.stats.uploaded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Screenshot #{} uploaded for task {} ({} bytes)",
                    frame.sequence, ack.task_id, ack.bytes
                );
            }
            Err(e) => {
                let failed = self.stats.failed.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Screenshot #{} for task {} dropped: {} (total failures: {})",
                    frame.sequence, frame.task_id, e, failed
                );
            }
        }
        result
    }

    /// Spawn an independent upload task for one frame
    ///
    /// The task is detached: it is neither awaited nor aborted when the
    /// session stops.
    pub fn dispatch(&self, frame: CapturedFrame) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let _ = dispatcher.upload(frame).await;
        });
    }

    /// Receive frames until stopped or the sampler goes away
    ///
    /// Frames still queued when stop is observed are dropped.
    pub async fn run(
        self,
        mut frames: mpsc::UnboundedReceiver<CapturedFrame>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = stop.wait_for(|stopped| *stopped) => break,
                frame = frames.recv() => match frame {
                    Some(frame) => self.dispatch(frame),
                    None => break,
                },
            }
        }

        frames.close();
        let dropped = std::iter::from_fn(|| frames.try_recv().ok()).count();
        if dropped > 0 {
            debug!("Dropped {} queued screenshots on stop", dropped);
        }

        info!(
            "Upload dispatcher exited: {} uploaded, {} failed, {} in flight",
            self.stats.uploaded(),
            self.stats.failed(),
            self.stats.in_flight()
        );
    }
}
