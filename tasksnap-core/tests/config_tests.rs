//! Integration tests for configuration system

use std::path::PathBuf;
use std::time::Duration;
use tasksnap_core::capture::CaptureType;
use tasksnap_core::config::{
    sample_config, CaptureConfig, ConfigFile, CursorMode, DEFAULT_INTERVAL, DEFAULT_UPLOAD_PATH,
};
use tempfile::TempDir;

#[test]
fn test_default_capture_config() {
    let config = CaptureConfig::default();
    assert_eq!(config.interval, DEFAULT_INTERVAL);
    assert_eq!(config.interval, Duration::from_secs(5));
    assert_eq!(config.source, CaptureType::Monitor);
    assert_eq!(config.cursor_mode, CursorMode::Embedded);
    assert_eq!(config.upload.upload_path, DEFAULT_UPLOAD_PATH);

    // No destination yet
    assert!(config.validate_strict().is_err());
}

#[test]
fn test_remote_config_builder() {
    let config = CaptureConfig::remote("https://tasks.example.com")
        .with_interval(Duration::from_secs(30))
        .with_source(CaptureType::Both)
        .with_cursor_mode(CursorMode::Hidden)
        .with_api_key("abc");

    assert_eq!(config.interval, Duration::from_secs(30));
    assert_eq!(config.source, CaptureType::Both);
    assert_eq!(config.upload.api_key.as_deref(), Some("abc"));
    assert!(config.validate_strict().is_ok());
    assert!(config.validate().is_empty());
}

#[test]
fn test_validation_warnings() {
    let fast = CaptureConfig::directory("/tmp/shots").with_interval(Duration::from_millis(200));
    assert!(fast.validate_strict().is_ok());
    assert!(!fast.validate().is_empty());

    let plain = CaptureConfig::remote("http://tasks.example.com");
    assert!(plain.validate().iter().any(|w| w.contains("plain HTTP")));

    let local = CaptureConfig::remote("http://localhost:8800");
    assert!(local.validate().is_empty());
}

#[test]
fn test_strict_validation_errors() {
    let zero = CaptureConfig::directory("/tmp/shots").with_interval(Duration::ZERO);
    assert!(zero.validate_strict().is_err());

    let bad_scheme = CaptureConfig::remote("ftp://tasks.example.com");
    assert!(bad_scheme.validate_strict().is_err());

    let bad_path = CaptureConfig::remote("https://tasks.example.com").with_upload_path("/upload");
    assert!(bad_path.validate_strict().is_err());
}

#[test]
fn test_sample_config_is_valid_toml() {
    let file: ConfigFile = toml::from_str(&sample_config()).expect("sample config parses");
    assert_eq!(file.capture.interval_secs, 5);
    assert_eq!(file.capture.source, "monitor");
    assert_eq!(file.upload.upload_path, DEFAULT_UPLOAD_PATH);
    assert!(file.upload.server_url.is_none());
}

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut file = ConfigFile::default();
    file.capture.interval_secs = 10;
    file.capture.source = "window".into();
    file.upload.server_url = Some("https://tasks.example.com".into());
    file.save_to(path.clone()).unwrap();

    let loaded = ConfigFile::load_from(path).unwrap();
    assert_eq!(loaded.capture.interval_secs, 10);

    let config = loaded.to_capture_config().unwrap();
    assert_eq!(config.interval, Duration::from_secs(10));
    assert_eq!(config.source, CaptureType::Window);
    assert_eq!(
        config.upload.server_url.as_deref(),
        Some("https://tasks.example.com")
    );
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let loaded = ConfigFile::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded.capture.interval_secs, 5);
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[upload]\noutput_dir = \"/tmp/shots\"\n").unwrap();

    let config = ConfigFile::load_from(path).unwrap().to_capture_config().unwrap();
    assert_eq!(config.interval, DEFAULT_INTERVAL);
    assert_eq!(config.upload.output_dir, Some(PathBuf::from("/tmp/shots")));
    assert!(config.validate_strict().is_ok());
}

#[test]
fn test_invalid_source_is_config_error() {
    let mut file = ConfigFile::default();
    file.capture.source = "projector".into();
    assert!(file.to_capture_config().is_err());
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[capture\ninterval_secs = ").unwrap();
    assert!(ConfigFile::load_from(path).is_err());
}
