//! IPC server for daemon mode
//!
//! Listens on a Unix socket and routes CLI requests to the session
//! controller.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::protocol::{DaemonStatus, IpcMessage, IpcResponse, SessionStatistics};
use super::socket_path;
use crate::error::{Result, SnapError};
use crate::session::SessionController;
use crate::types::TaskSignal;

/// How long `accept_one` waits before giving the caller a chance to check for shutdown
const ACCEPT_TIMEOUT: Duration = Duration::from_millis(100);

/// IPC server that handles client connections
pub struct IpcServer {
    /// Path to the Unix socket
    socket_path: PathBuf,
    /// Listener for incoming connections
    listener: Option<UnixListener>,
    /// Shared by every connection task
    handler: Handler,
}

/// Routes messages from one connection to the controller
#[derive(Clone)]
struct Handler {
    /// Session controller driven by signals
    controller: Arc<SessionController>,
    /// Raised by a `Shutdown` message
    shutdown: Arc<watch::Sender<bool>>,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl IpcServer {
    /// Create a server on the default socket path
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self::with_path(controller, socket_path())
    }

    /// Create a server on a specific socket path
    pub fn with_path(controller: Arc<SessionController>, path: impl Into<PathBuf>) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            socket_path: path.into(),
            listener: None,
            handler: Handler {
                controller,
                shutdown: Arc::new(shutdown),
                start_time: Instant::now(),
            },
        }
    }

    /// Path of the socket
    pub fn path(&self) -> &Path {
        &self.socket_path
    }

    /// Start listening for connections
    pub async fn start(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .map_err(|e| SnapError::config(format!("Failed to remove old socket: {}", e)))?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SnapError::config(format!("Failed to create socket directory: {}", e))
                })?;
            }
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            SnapError::config(format!(
                "Failed to bind socket at {:?}: {}",
                self.socket_path, e
            ))
        })?;

        // Owner-only
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&self.socket_path, permissions).map_err(|e| {
            warn!("Failed to set socket permissions: {}", e);
            SnapError::config(format!("Failed to set socket permissions: {}", e))
        })?;

        info!("IPC server listening on {:?}", self.socket_path);
        self.listener = Some(listener);

        Ok(())
    }

    /// Accept one connection and serve it on its own task
    ///
    /// A signal waiting on the screen-share picker does not hold up other
    /// clients. Returns true if the server should continue, false once a
    /// client has asked it to shut down.
    pub async fn accept_one(&self) -> Result<bool> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| SnapError::config("Server not started"))?;

        if self.shutdown_requested() {
            return Ok(false);
        }

        match tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept()).await {
            Ok(Ok((stream, _addr))) => {
                debug!("IPC client connected");
                let handler = self.handler.clone();
                tokio::spawn(async move { handler.handle_connection(stream).await });
            }
            Ok(Err(e)) => error!("Failed to accept connection: {}", e),
            Err(_) => {}
        }

        Ok(!self.shutdown_requested())
    }

    fn shutdown_requested(&self) -> bool {
        *self.handler.shutdown.borrow()
    }

    /// Clean up the socket file
    pub fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            } else {
                debug!("Removed socket file {:?}", self.socket_path);
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl Handler {
    /// Serve requests on one connection until it closes
    async fn handle_connection(&self, stream: UnixStream) {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("IPC client disconnected");
                    return;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match IpcMessage::from_bytes(trimmed.as_bytes()) {
                        Ok(msg) => self.handle_message(msg).await,
                        Err(e) => {
                            warn!("Invalid IPC message: {}", e);
                            IpcResponse::error(format!("Invalid message: {}", e))
                        }
                    };

                    if let Err(e) = writer.write_all(&response.to_bytes()).await {
                        error!("Failed to send IPC response: {}", e);
                        return;
                    }
                }
                Err(e) => {
                    error!("Error reading from IPC client: {}", e);
                    return;
                }
            }
        }
    }

    async fn handle_message(&self, msg: IpcMessage) -> IpcResponse {
        match msg {
            IpcMessage::Ping => IpcResponse::Pong,
            IpcMessage::Status => IpcResponse::Status(self.status()),
            IpcMessage::Stats => match self.controller.stats() {
                Some(stats) => IpcResponse::Stats(SessionStatistics::from(stats)),
                None => IpcResponse::error("No capture session yet"),
            },
            IpcMessage::Signal { task_id, stage } => {
                info!("Task {} signalled as {}", task_id, stage);
                let signal = TaskSignal { task_id, stage };
                match self.controller.handle_signal(signal).await {
                    Ok(Some(info)) => IpcResponse::started(&info),
                    Ok(None) => IpcResponse::Ok,
                    Err(e) => IpcResponse::error(e.to_string()),
                }
            }
            IpcMessage::StopSession => match self.controller.stop().await {
                Ok(()) => IpcResponse::Ok,
                Err(e) => IpcResponse::error(e.to_string()),
            },
            IpcMessage::Shutdown => {
                info!("Received shutdown command via IPC");
                self.shutdown.send_replace(true);
                IpcResponse::Stopping
            }
        }
    }

    fn status(&self) -> DaemonStatus {
        let config = self.controller.config();
        let destination = config.upload.server_url.clone().or_else(|| {
            config
                .upload
                .output_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
        });

        DaemonStatus {
            state: self.controller.state().to_string(),
            task_id: self.controller.task_id().map(|t| t.to_string()),
            interval_ms: config.interval.as_millis() as u64,
            destination,
            pid: std::process::id(),
            uptime_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}
