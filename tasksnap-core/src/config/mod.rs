//! Configuration types for tasksnap
//!
//! Provides the sampling cadence, capture source selection and upload
//! destination used to build a capture session.

mod file;

pub use file::{sample_config, CaptureSettings, ConfigFile, UploadSettings};

use crate::capture::CaptureType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default time between screenshots
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Default upload route, `{task_id}` is substituted
pub const DEFAULT_UPLOAD_PATH: &str = "/api/task/upload-image/{task_id}";

/// Cursor capture mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    /// Hide cursor in capture
    Hidden,
    /// Show cursor embedded in capture frames
    #[default]
    Embedded,
    /// Cursor metadata only (compositor-dependent)
    Metadata,
}

impl std::str::FromStr for CursorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hidden" | "none" => Ok(Self::Hidden),
            "embedded" | "show" => Ok(Self::Embedded),
            "metadata" => Ok(Self::Metadata),
            _ => Err(format!("Unknown cursor mode: {}", s)),
        }
    }
}

/// Where screenshots are sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base URL of the task-storage service
    pub server_url: Option<String>,
    /// Bearer token for the storage service
    pub api_key: Option<String>,
    /// Route template appended to `server_url`
    pub upload_path: String,
    /// Local directory to write screenshots to instead of uploading
    pub output_dir: Option<PathBuf>,
}

impl UploadConfig {
    /// Upload to a remote server
    pub fn remote(server_url: impl Into<String>) -> Self {
        Self {
            server_url: Some(server_url.into()),
            api_key: None,
            upload_path: DEFAULT_UPLOAD_PATH.to_string(),
            output_dir: None,
        }
    }

    /// Write into a local directory
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            server_url: None,
            api_key: None,
            upload_path: DEFAULT_UPLOAD_PATH.to_string(),
            output_dir: Some(path.into()),
        }
    }

    /// Whether any destination is configured
    pub fn has_destination(&self) -> bool {
        self.server_url.is_some() || self.output_dir.is_some()
    }
}

/// Complete capture configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Time between screenshots
    pub interval: Duration,
    /// Which sources the picker offers
    pub source: CaptureType,
    /// Cursor capture mode
    pub cursor_mode: CursorMode,
    /// Upload destination
    pub upload: UploadConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            source: CaptureType::default(),
            cursor_mode: CursorMode::default(),
            upload: UploadConfig {
                upload_path: DEFAULT_UPLOAD_PATH.to_string(),
                ..UploadConfig::default()
            },
        }
    }
}

impl CaptureConfig {
    /// Create a config uploading to a remote server
    pub fn remote(server_url: impl Into<String>) -> Self {
        Self {
            upload: UploadConfig::remote(server_url),
            ..Self::default()
        }
    }

    /// Create a config writing screenshots to a directory
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            upload: UploadConfig::directory(path),
            ..Self::default()
        }
    }

    /// Set the sampling interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the capture source type
    pub fn with_source(mut self, source: CaptureType) -> Self {
        self.source = source;
        self
    }

    /// Set the cursor capture mode
    pub fn with_cursor_mode(mut self, mode: CursorMode) -> Self {
        self.cursor_mode = mode;
        self
    }

    /// Set the storage API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.upload.api_key = Some(key.into());
        self
    }

    /// Set the upload route template
    pub fn with_upload_path(mut self, path: impl Into<String>) -> Self {
        self.upload.upload_path = path.into();
        self
    }

    /// Validate the configuration and return any warnings
    ///
    /// An empty list means the configuration looks good.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.interval.is_zero() && self.interval < Duration::from_secs(1) {
            warnings.push(format!(
                "Interval of {}ms will upload a screenshot more than once per second.",
                self.interval.as_millis()
            ));
        }

        if self.interval > Duration::from_secs(600) {
            warnings.push(format!(
                "Interval of {}s is very long; short tasks may get no screenshots.",
                self.interval.as_secs()
            ));
        }

        if let Some(url) = &self.upload.server_url {
            let local = url.contains("://localhost") || url.contains("://127.0.0.1");
            if url.starts_with("http://") && !local {
                warnings.push(format!(
                    "Server {} uses plain HTTP; screenshots will be sent unencrypted.",
                    url
                ));
            }
        }

        if self.upload.server_url.is_some() && self.upload.output_dir.is_some() {
            warnings.push("Both server_url and output_dir are set; server_url wins.".to_string());
        }

        warnings
    }

    /// Validate and return an error if configuration cannot work
    pub fn validate_strict(&self) -> Result<(), String> {
        if self.interval.is_zero() {
            return Err("Interval cannot be zero".to_string());
        }

        if !self.upload.has_destination() {
            return Err("No upload destination: set server_url or output_dir".to_string());
        }

        if let Some(url) = &self.upload.server_url {
            if url.trim().is_empty() {
                return Err("server_url cannot be empty".to_string());
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("server_url must start with http:// or https://: {}", url));
            }
            if !self.upload.upload_path.contains("{task_id}") {
                return Err(format!(
                    "upload_path must contain {{task_id}}: {}",
                    self.upload.upload_path
                ));
            }
        }

        Ok(())
    }
}
