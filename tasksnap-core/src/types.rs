//! Core types for tasksnap
//!
//! These types represent the data that flows from the capture stream,
//! through the sampler, to the screenshot store.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::error::{Result, SnapError};

/// Global handle counter for unique session IDs
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

/// Identifier of a task in the remote task-storage service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Create a task id
    ///
    /// Only ASCII letters, digits, `-` and `_` are accepted, so an id is
    /// always safe as a single path or URL segment.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty()
            || !id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(SnapError::InvalidTaskId(id));
        }
        Ok(Self(id))
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskId {
    type Error = SnapError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl std::str::FromStr for TaskId {
    type Err = SnapError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Workflow stage of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TaskStage {
    #[default]
    #[serde(rename = "todo")]
    Todo,
    #[serde(rename = "in progress", alias = "in-progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
}

impl std::fmt::Display for TaskStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::InProgress => write!(f, "in progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for TaskStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "in progress" | "in-progress" | "inprogress" | "started" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            _ => Err(format!("Unknown task stage: {}", s)),
        }
    }
}

/// A task-state change reported by the task board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSignal {
    /// Task that changed
    pub task_id: TaskId,
    /// Stage it moved to
    pub stage: TaskStage,
}

impl TaskSignal {
    /// Signal that a task entered "in progress"
    pub fn in_progress(task_id: TaskId) -> Self {
        Self {
            task_id,
            stage: TaskStage::InProgress,
        }
    }
}

/// Kind of capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Full monitor/display capture
    Monitor,
    /// Individual window capture
    Window,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Monitor => write!(f, "Monitor"),
            SourceKind::Window => write!(f, "Window"),
        }
    }
}

/// Readiness of a playback surface, ordered from least to most ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ReadyState {
    /// Nothing negotiated yet
    #[default]
    HaveNothing,
    /// Format known, no frame yet
    HaveMetadata,
    /// A frame exists but the stream is not flowing
    HaveCurrentData,
    /// Frames are flowing
    HaveEnoughData,
}

/// Pixel layout of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// B, G, R, unused
    Bgrx,
    /// B, G, R, A
    Bgra,
    /// R, G, B, unused
    Rgbx,
    /// R, G, B, A
    Rgba,
    /// Packed 24-bit R, G, B
    Rgb,
    /// Packed 24-bit B, G, R
    Bgr,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::Rgb | Self::Bgr => 3,
            _ => 4,
        }
    }
}

/// A CPU-side video frame as delivered by the capture stream
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Stride in bytes
    pub stride: u32,
    /// Pixel layout
    pub format: PixelFormat,
    /// Pixel data, `stride * height` bytes
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Create a tightly packed frame
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width.saturating_mul(format.bytes_per_pixel()),
            format,
            data,
        }
    }

    /// Whether the buffer is large enough for the declared geometry
    pub fn is_complete(&self) -> bool {
        let row = self.width as usize * self.format.bytes_per_pixel() as usize;
        if self.width == 0 || self.height == 0 || (self.stride as usize) < row {
            return false;
        }
        (self.stride as usize)
            .checked_mul(self.height as usize - 1)
            .and_then(|n| n.checked_add(row))
            .is_some_and(|needed| self.data.len() >= needed)
    }
}

/// An encoded screenshot waiting to be uploaded
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Task the screenshot belongs to
    pub task_id: TaskId,
    /// PNG bytes
    pub png: Bytes,
    /// When the frame was sampled
    pub captured_at: SystemTime,
    /// Tick sequence number within the session (1-based)
    pub sequence: u64,
}

/// Session controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SessionState {
    /// No session
    #[default]
    Idle,
    /// Waiting for the user to grant screen capture
    Requesting,
    /// Sampling frames
    Active,
    /// Session ended; terminal for that session instance
    Stopped,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Requesting => write!(f, "Requesting"),
            Self::Active => write!(f, "Active"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Milliseconds since the unix epoch, 0 if the clock is before it
pub fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_validation() {
        assert!(TaskId::new("65f1c0ffee").is_ok());
        assert!(TaskId::new("").is_err());
        assert!(TaskId::new("  ").is_err());
        assert!(TaskId::new("a/b").is_err());
        assert!(TaskId::new(" padded").is_err());
        assert!(TaskId::new("task_42-b").is_ok());
        assert!(TaskId::new("..").is_err());
        assert!(TaskId::new(".").is_err());
        assert!(TaskId::new("a?b").is_err());
        assert!(TaskId::new("a#b").is_err());
        assert!(TaskId::new("a%2Fb").is_err());
    }

    #[test]
    fn test_task_stage_parse() {
        assert_eq!("in progress".parse::<TaskStage>(), Ok(TaskStage::InProgress));
        assert_eq!("in-progress".parse::<TaskStage>(), Ok(TaskStage::InProgress));
        assert_eq!("TODO".parse::<TaskStage>(), Ok(TaskStage::Todo));
        assert!("archived".parse::<TaskStage>().is_err());
    }

    #[test]
    fn test_task_stage_serde_matches_board() {
        let json = serde_json::to_string(&TaskStage::InProgress).unwrap();
        assert_eq!(json, "\"in progress\"");
    }

    #[test]
    fn test_ready_state_ordering() {
        assert!(ReadyState::HaveMetadata < ReadyState::HaveEnoughData);
        assert!(ReadyState::HaveCurrentData < ReadyState::HaveEnoughData);
    }

    #[test]
    fn test_raw_frame_completeness() {
        let frame = RawFrame::packed(2, 2, PixelFormat::Bgra, vec![0; 16]);
        assert!(frame.is_complete());

        let short = RawFrame::packed(2, 2, PixelFormat::Bgra, vec![0; 12]);
        assert!(!short.is_complete());
    }

    #[test]
    fn test_raw_frame_huge_geometry_is_incomplete() {
        let wide = RawFrame::packed(u32::MAX, 1, PixelFormat::Bgra, vec![0; 64]);
        assert!(!wide.is_complete());

        let tall = RawFrame {
            width: 1 << 30,
            height: u32::MAX,
            stride: u32::MAX,
            format: PixelFormat::Bgrx,
            data: vec![0; 64],
        };
        assert!(!tall.is_complete());
    }

    #[test]
    fn test_handles_unique() {
        assert_ne!(Handle::new(), Handle::new());
    }
}
