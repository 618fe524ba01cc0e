//! IPC client for CLI commands
//!
//! Connects to the running daemon to send commands and receive responses.

use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::protocol::{DaemonStatus, IpcMessage, IpcResponse, SessionStatistics};
use super::socket_path;
use crate::error::{Result, SnapError};
use crate::types::TaskSignal;

/// Default connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read/write timeout
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Signals may wait on the screen-share picker
const SIGNAL_TIMEOUT: Duration = Duration::from_secs(120);

/// IPC client for communicating with the daemon
pub struct IpcClient {
    stream: UnixStream,
}

impl IpcClient {
    /// Connect to the daemon with default timeout
    pub async fn connect() -> Result<Self> {
        Self::connect_to(&socket_path(), CONNECT_TIMEOUT).await
    }

    /// Connect to a daemon socket with custom timeout
    pub async fn connect_to(path: &Path, timeout: Duration) -> Result<Self> {
        if !path.exists() {
            return Err(SnapError::config(format!(
                "tasksnap daemon is not running (no socket at {})",
                path.display()
            )));
        }

        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| SnapError::config("Connection timed out"))?
            .map_err(|e| SnapError::config(format!("Failed to connect to daemon: {}", e)))?;

        debug!("Connected to daemon at {:?}", path);

        Ok(Self { stream })
    }

    /// Send a message and receive a response with timeout
    async fn send(&mut self, msg: IpcMessage) -> Result<IpcResponse> {
        self.send_with_timeout(msg, IO_TIMEOUT).await
    }

    /// Send a message and receive a response with custom timeout
    async fn send_with_timeout(
        &mut self,
        msg: IpcMessage,
        timeout: Duration,
    ) -> Result<IpcResponse> {
        let (reader, mut writer) = self.stream.split();

        tokio::time::timeout(timeout, writer.write_all(&msg.to_bytes()))
            .await
            .map_err(|_| SnapError::config("Write timed out"))?
            .map_err(|e| SnapError::config(format!("Failed to send message: {}", e)))?;

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        tokio::time::timeout(timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| SnapError::config("Read timed out"))?
            .map_err(|e| SnapError::config(format!("Failed to read response: {}", e)))?;

        IpcResponse::from_bytes(line.trim().as_bytes())
            .map_err(|e| SnapError::config(format!("Invalid response: {}", e)))
    }

    /// Ping the daemon to check if it's alive
    pub async fn ping(&mut self) -> Result<bool> {
        match self.send(IpcMessage::Ping).await {
            Ok(IpcResponse::Pong) => Ok(true),
            Ok(_) => Ok(false),
            Err(_) => Ok(false),
        }
    }

    /// Get the current status
    pub async fn status(&mut self) -> Result<DaemonStatus> {
        match self.send(IpcMessage::Status).await? {
            IpcResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    /// Get session statistics
    pub async fn stats(&mut self) -> Result<SessionStatistics> {
        match self.send(IpcMessage::Stats).await? {
            IpcResponse::Stats(stats) => Ok(stats),
            other => Err(unexpected(other)),
        }
    }

    /// Deliver a task-state signal
    ///
    /// Returns the started-session response, or `Ok` if the signal did not
    /// start anything.
    pub async fn signal(&mut self, signal: TaskSignal) -> Result<IpcResponse> {
        let msg = IpcMessage::Signal {
            task_id: signal.task_id,
            stage: signal.stage,
        };
        match self.send_with_timeout(msg, SIGNAL_TIMEOUT).await? {
            resp @ (IpcResponse::Ok | IpcResponse::Started { .. }) => Ok(resp),
            other => Err(unexpected(other)),
        }
    }

    /// Stop the running session, keeping the daemon
    pub async fn stop_session(&mut self) -> Result<()> {
        match self.send(IpcMessage::StopSession).await? {
            IpcResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Request the daemon to shut down
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.send(IpcMessage::Shutdown).await? {
            IpcResponse::Stopping => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(resp: IpcResponse) -> SnapError {
    match resp {
        IpcResponse::Error { message } => SnapError::config(message),
        other => SnapError::config(format!("Unexpected response: {:?}", other)),
    }
}
