//! Configuration file loading and merging
//!
//! Loads user configuration from `~/.config/tasksnap/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CaptureConfig, CursorMode, UploadConfig, DEFAULT_UPLOAD_PATH};
use crate::capture::CaptureType;
use crate::error::{Result, SnapError};

/// Environment variable overriding `upload.server_url`
pub const ENV_SERVER_URL: &str = "TASKSNAP_SERVER_URL";

/// Environment variable overriding `upload.api_key`
pub const ENV_API_KEY: &str = "TASKSNAP_API_KEY";

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Capture settings
    #[serde(default)]
    pub capture: CaptureSettings,

    /// Upload settings
    #[serde(default)]
    pub upload: UploadSettings,
}

/// Capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Seconds between screenshots
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Source offered by the picker (monitor, window, both)
    #[serde(default = "default_source")]
    pub source: String,

    /// Cursor mode (hidden, embedded, metadata)
    #[serde(default = "default_cursor")]
    pub cursor: String,
}

/// Upload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Base URL of the task-storage service
    #[serde(default)]
    pub server_url: Option<String>,

    /// Bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Route template, `{task_id}` is substituted
    #[serde(default = "default_upload_path")]
    pub upload_path: String,

    /// Write screenshots here instead of uploading
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

// Default value functions
fn default_interval_secs() -> u64 {
    5
}

fn default_source() -> String {
    "monitor".to_string()
}

fn default_cursor() -> String {
    "embedded".to_string()
}

fn default_upload_path() -> String {
    DEFAULT_UPLOAD_PATH.to_string()
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            source: default_source(),
            cursor: default_cursor(),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            upload_path: default_upload_path(),
            output_dir: None,
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("tasksnap").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("tasksnap")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/tasksnap/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| SnapError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| SnapError::Config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Apply `TASKSNAP_*` environment overrides
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(
            std::env::var(ENV_SERVER_URL).ok(),
            std::env::var(ENV_API_KEY).ok(),
        );
        self
    }

    fn apply_overrides(&mut self, server_url: Option<String>, api_key: Option<String>) {
        if let Some(url) = server_url.filter(|u| !u.trim().is_empty()) {
            debug!("Using server_url from {}", ENV_SERVER_URL);
            self.upload.server_url = Some(url);
        }
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            self.upload.api_key = Some(key);
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SnapError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SnapError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| SnapError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Build a runtime capture config from the file settings
    pub fn to_capture_config(&self) -> Result<CaptureConfig> {
        let source: CaptureType = self.capture.source.parse().map_err(SnapError::Config)?;
        let cursor_mode: CursorMode = self.capture.cursor.parse().map_err(SnapError::Config)?;

        Ok(CaptureConfig {
            interval: Duration::from_secs(self.capture.interval_secs),
            source,
            cursor_mode,
            upload: UploadConfig {
                server_url: self.upload.server_url.clone(),
                api_key: self.upload.api_key.clone(),
                upload_path: self.upload.upload_path.clone(),
                output_dir: self.upload.output_dir.clone(),
            },
        })
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# tasksnap configuration

[capture]
# Seconds between screenshots while a task is in progress
interval_secs = 5

# What the screen picker offers: monitor, window, both
source = "monitor"

# Cursor in screenshots: hidden, embedded, metadata
cursor = "embedded"

[upload]
# Task-storage service (overridden by TASKSNAP_SERVER_URL)
# server_url = "https://tasks.example.com"

# Bearer token (overridden by TASKSNAP_API_KEY)
# api_key = ""

# Route for appending a screenshot; {task_id} is replaced
upload_path = "/api/task/upload-image/{task_id}"

# Write PNGs to this directory instead of uploading
# output_dir = "/home/me/Pictures/tasksnap"
"#
    .to_string()
}
