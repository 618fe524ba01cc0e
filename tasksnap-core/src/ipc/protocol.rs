//! IPC protocol definitions
//!
//! Newline-delimited JSON, one request and one response per line.

use serde::{Deserialize, Serialize};

use crate::session::{SessionInfo, SessionStats};
use crate::types::{TaskId, TaskStage};

/// Messages that can be sent to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcMessage {
    /// Check if daemon is alive
    Ping,
    /// Request current status
    Status,
    /// Request session statistics
    Stats,
    /// Task-state signal, starts a session on the edge into in-progress
    Signal { task_id: TaskId, stage: TaskStage },
    /// Stop the running session but keep the daemon
    StopSession,
    /// Stop the daemon
    Shutdown,
}

/// Responses from the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    /// Simple acknowledgment
    Ok,
    /// Pong response to ping
    Pong,
    /// Error response
    Error { message: String },
    /// Status response
    Status(DaemonStatus),
    /// Statistics response
    Stats(SessionStatistics),
    /// A signal started a session
    Started {
        handle: u64,
        task_id: String,
        width: u32,
        height: u32,
    },
    /// Shutdown acknowledgment
    Stopping,
}

/// Current daemon status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Session controller state name
    pub state: String,
    /// Task of the current or last session
    pub task_id: Option<String>,
    /// Sampling interval in milliseconds
    pub interval_ms: u64,
    /// Where screenshots go
    pub destination: Option<String>,
    /// Process ID
    pub pid: u32,
    /// Uptime in seconds
    pub uptime_seconds: f64,
}

/// Session statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub handle: u64,
    pub task_id: String,
    pub state: String,
    pub ticks: u64,
    pub captured: u64,
    pub skipped: u64,
    pub uploaded: u64,
    pub failed: u64,
    pub in_flight: u64,
    pub elapsed_seconds: f64,
}

impl From<SessionStats> for SessionStatistics {
    fn from(stats: SessionStats) -> Self {
        Self {
            handle: stats.handle.as_u64(),
            task_id: stats.task_id.to_string(),
            state: stats.state.to_string(),
            ticks: stats.ticks,
            captured: stats.captured,
            skipped: stats.skipped,
            uploaded: stats.uploaded,
            failed: stats.failed,
            in_flight: stats.in_flight,
            elapsed_seconds: stats.elapsed.as_secs_f64(),
        }
    }
}

impl IpcMessage {
    /// Serialize message to JSON bytes with newline terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl IpcResponse {
    /// Serialize response to JSON bytes with newline terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Deserialize response from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        IpcResponse::Error {
            message: message.into(),
        }
    }

    /// Response for a session that just started
    pub fn started(info: &SessionInfo) -> Self {
        IpcResponse::Started {
            handle: info.handle.as_u64(),
            task_id: info.task_id.to_string(),
            width: info.width,
            height: info.height,
        }
    }
}
