//! HTTP screenshot store
//!
//! Appends screenshots to a task on the task-storage service with a JSON
//! POST. The PNG travels base64-encoded.

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;

use super::{ScreenshotStore, UploadAck};
use crate::config::DEFAULT_UPLOAD_PATH;
use crate::error::{Result, SnapError};
use crate::types::TaskId;

/// Request body for one screenshot
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadBody<'a> {
    task_id: &'a str,
    image: String,
    mime_type: &'static str,
}

/// Store backed by the task-storage REST API
pub struct HttpScreenshotStore {
    base_url: String,
    upload_path: String,
    client: Client,
    api_key: Option<String>,
}

impl HttpScreenshotStore {
    /// Store posting to `base_url` on the default upload route
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            upload_path: DEFAULT_UPLOAD_PATH.to_string(),
            client: Client::new(),
            api_key: None,
        }
    }

    /// Use a different upload route; `{task_id}` is replaced per request
    pub fn with_upload_path(mut self, path: impl Into<String>) -> Self {
        self.upload_path = path.into();
        self
    }

    /// Send a bearer token with every request
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Full URL for a task's upload route
    pub fn url_for(&self, task_id: &TaskId) -> String {
        let path = self.upload_path.replace("{task_id}", task_id.as_str());
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }
}

#[async_trait]
impl ScreenshotStore for HttpScreenshotStore {
    async fn append(&self, task_id: &TaskId, png: Bytes) -> Result<UploadAck> {
        let body = UploadBody {
            task_id: task_id.as_str(),
            image: base64::engine::general_purpose::STANDARD.encode(&png),
            mime_type: "image/png",
        };

        let builder = self.client.post(self.url_for(task_id)).json(&body);
        let resp = self
            .with_auth(builder)
            .send()
            .await
            .map_err(|e| SnapError::network(format!("connection failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            let location = resp
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            Ok(UploadAck {
                task_id: task_id.clone(),
                bytes: png.len(),
                location,
            })
        } else {
            Err(parse_error_with_status(status, resp).await)
        }
    }
}

async fn parse_error_with_status(status: StatusCode, resp: reqwest::Response) -> SnapError {
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v["message"]
                .as_str()
                .or_else(|| v["error"].as_str())
                .map(String::from)
        })
        .unwrap_or(body);

    SnapError::Server {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_substitutes_task_id() {
        let store = HttpScreenshotStore::new("https://tasks.example.com/");
        let task = TaskId::new("abc123").unwrap();
        assert_eq!(
            store.url_for(&task),
            "https://tasks.example.com/api/task/upload-image/abc123"
        );
    }

    #[test]
    fn test_relative_upload_path() {
        let store = HttpScreenshotStore::new("http://localhost:8800")
            .with_upload_path("tasks/{task_id}/screenshots");
        let task = TaskId::new("t1").unwrap();
        assert_eq!(
            store.url_for(&task),
            "http://localhost:8800/tasks/t1/screenshots"
        );
    }

    #[test]
    fn test_url_has_no_query_or_fragment() {
        let store = HttpScreenshotStore::new("https://tasks.example.com");
        assert!("a?b".parse::<TaskId>().is_err());
        assert!("a#b".parse::<TaskId>().is_err());

        let url = store.url_for(&TaskId::new("65f1aa_b-2").unwrap());
        let parsed = reqwest::Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/api/task/upload-image/65f1aa_b-2");
        assert!(parsed.query().is_none());
        assert!(parsed.fragment().is_none());
    }
}
