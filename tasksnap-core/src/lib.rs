//! Tasksnap Core Library
//!
//! Periodic screenshots of a shared screen while a task is in progress.
//!
//! This library provides:
//! - Wayland screen capture via xdg-desktop-portal and PipeWire
//! - Fixed-interval frame sampling with PNG encoding
//! - Fire-and-forget upload to a task-storage service
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────┐    ┌──────────────────┐
//! │ Portal Capture  │───▶│ Frame Sampler│───▶│ Upload Dispatcher│
//! │ (PipeWire In)   │    │ (PNG encode) │    │ (HTTP / dir)     │
//! └─────────────────┘    └──────────────┘    └──────────────────┘
//!          ▲
//!          └──────── Session Controller ◀── task signal
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod ipc;
pub mod render;
pub mod sampler;
pub mod session;
pub mod types;
pub mod upload;

pub use capture::{CaptureSource, CaptureType, MediaStream, PlaybackSurface};
pub use config::{CaptureConfig, UploadConfig};
pub use error::{Result, SnapError};
pub use session::{SessionController, SessionInfo, SessionStats};
pub use types::{Handle, SessionState, SourceKind, TaskId, TaskSignal, TaskStage};
pub use upload::{ScreenshotStore, UploadDispatcher};
