//! Error types for tasksnap

use thiserror::Error;

/// Result type alias using SnapError
pub type Result<T> = std::result::Result<T, SnapError>;

/// Main error type for tasksnap operations
#[derive(Debug, Error)]
pub enum SnapError {
    /// User or compositor refused the screen capture request
    #[error("Screen capture denied: {0}")]
    AcquisitionDenied(String),

    /// Nothing capturable was offered by the host
    #[error("No display available for capture: {0}")]
    NoDisplayAvailable(String),

    /// Upload could not reach the storage service
    #[error("Network error: {0}")]
    Network(String),

    /// Storage service rejected the upload
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Portal/D-Bus communication error
    #[error("Portal error: {0}")]
    Portal(String),

    /// PipeWire error
    #[error("PipeWire error: {0}")]
    PipeWire(String),

    /// Frame render or PNG encode error
    #[error("Encode error: {0}")]
    Encode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Task identifier was empty or malformed
    #[error("Invalid task id: {0:?}")]
    InvalidTaskId(String),

    /// Capture session not active
    #[error("No active capture session")]
    NoActiveSession,

    /// A session is already requesting or active
    #[error("Capture session already active for task {0}")]
    SessionAlreadyActive(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SnapError>,
    },
}

impl SnapError {
    /// Create a portal error
    pub fn portal(msg: impl Into<String>) -> Self {
        Self::Portal(msg.into())
    }

    /// Create a PipeWire error
    pub fn pipewire(msg: impl Into<String>) -> Self {
        Self::PipeWire(msg.into())
    }

    /// Create an encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a denied-acquisition error
    pub fn denied(msg: impl Into<String>) -> Self {
        Self::AcquisitionDenied(msg.into())
    }

    /// Create a no-display error
    pub fn no_display(msg: impl Into<String>) -> Self {
        Self::NoDisplayAvailable(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &SnapError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error ends a session attempt
    ///
    /// Only acquisition failures are surfaced to the user; per-frame
    /// failures are absorbed by the sampler and dispatcher.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self.root(),
            Self::AcquisitionDenied(_) | Self::NoDisplayAvailable(_)
        )
    }

    /// Whether this error came from a single frame upload
    pub fn is_upload_failure(&self) -> bool {
        matches!(self.root(), Self::Network(_) | Self::Server { .. })
    }

    /// A short hint for the user, if one applies
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::AcquisitionDenied(_) => {
                Some("Screen sharing was cancelled. Start the task again and pick a screen or window.")
            }
            Self::NoDisplayAvailable(_) => Some(
                "Make sure xdg-desktop-portal and a backend with ScreenCast support are running.",
            ),
            Self::Portal(_) => Some("Check that xdg-desktop-portal is running: systemctl --user status xdg-desktop-portal"),
            Self::PipeWire(_) => Some("Check that PipeWire is running: systemctl --user status pipewire"),
            Self::Network(_) | Self::Server { .. } => {
                Some("Check server_url and api_key in your config.toml")
            }
            Self::Config(_) => Some("Run `tasksnap config init` to create a fresh config.toml"),
            Self::SessionAlreadyActive(_) => Some("Stop the running session with `tasksnap stop --session`"),
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

// Conversions from external error types

impl From<pipewire::Error> for SnapError {
    fn from(err: pipewire::Error) -> Self {
        Self::PipeWire(err.to_string())
    }
}

impl From<image::ImageError> for SnapError {
    fn from(err: image::ImageError) -> Self {
        Self::Encode(err.to_string())
    }
}

impl From<reqwest::Error> for SnapError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Server {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => Self::Network(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fatal_through_context() {
        let err = SnapError::denied("cancelled").with_context("Starting session");
        assert!(err.is_session_fatal());
        assert!(!err.is_upload_failure());
    }

    #[test]
    fn test_upload_failures_not_fatal() {
        let err = SnapError::Server {
            status: 500,
            message: "boom".into(),
        };
        assert!(err.is_upload_failure());
        assert!(!err.is_session_fatal());
        assert!(!SnapError::network("refused").is_session_fatal());
    }

    #[test]
    fn test_pipewire_failure_keeps_hint_through_context() {
        let err = SnapError::from(pipewire::Error::CreationFailed)
            .with_context("Failed to create main loop");
        assert!(matches!(err.root(), SnapError::PipeWire(_)));
        assert!(err.to_string().starts_with("Failed to create main loop: "));
        assert!(err.user_hint().unwrap().contains("PipeWire"));
    }
}
