use reqwest::{multipart, Client};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::time::Duration;

use super::retry::{is_retryable_status, RetryConfig, Sleeper};
use crate::errors::{AppError, AppResult};

/// Multipart body for a third-party posting relay.
pub struct RelayPayload {
    files: Vec<(String, Vec<u8>, String, String)>, // (filename, data, mime_type, field_name)
    text_fields: BTreeMap<String, String>,
}

impl RelayPayload {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            text_fields: BTreeMap::new(),
        }
    }

    pub fn add_text_field(&mut self, key: &str, value: &str) {
        self.text_fields.insert(key.to_string(), value.to_string());
    }

    pub async fn add_video(&mut self, file_path: &str, field_name: &str) -> AppResult<()> {
        let file_contents = tokio::fs::read(file_path).await?;
        let filename = Path::new(file_path)
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let mime_type = match Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("mov") => "video/quicktime",
            Some("avi") => "video/x-msvideo",
            _ => "video/mp4",
        };

        self.files.push((
            filename,
            file_contents,
            mime_type.to_string(),
            field_name.to_string(),
        ));
        Ok(())
    }

    pub fn build_form(&self) -> AppResult<multipart::Form> {
        let mut form = multipart::Form::new();

        for (key, value) in &self.text_fields {
            form = form.text(key.clone(), value.clone());
        }

        for (filename, data, mime_type, field_name) in &self.files {
            let part = multipart::Part::bytes(data.clone())
                .file_name(filename.clone())
                .mime_str(mime_type)?;

            form = form.part(field_name.clone(), part);
        }

        Ok(form)
    }
}

impl Default for RelayPayload {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RelayClient {
    client: Client,
    retry_config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl RelayClient {
    pub fn new(retry_config: RetryConfig, sleeper: Arc<dyn Sleeper>) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(600))
                .build()?,
            retry_config,
            sleeper,
        })
    }

    /// POST the payload, retrying server-side failures with jittered backoff.
    pub async fn send(&self, url: &str, payload: &RelayPayload) -> AppResult<String> {
        let mut attempt = 0;

        loop {
            let form = payload.build_form()?;
            let response = self.client.post(url).multipart(form).send().await?;
            let status = response.status();

            if status.is_success() {
                let response_text = response.text().await?;
                log::debug!(
                    "Relay response (first 300 chars): {}",
                    response_text.chars().take(300).collect::<String>()
                );
                return Ok(response_text);
            }

            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            attempt += 1;
            if is_retryable_status(status.as_u16()) && attempt <= self.retry_config.max_retries {
                let delay = self.retry_config.jittered_backoff(attempt);
                log::warn!(
                    "Relay attempt {} failed with {}, retrying in {:?}",
                    attempt,
                    status,
                    delay
                );
                self.sleeper.sleep(delay).await;
                continue;
            }

            return Err(AppError::UploadRejected {
                status: status.as_u16(),
                body: error_text,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_payload_reads_video() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"fake video").unwrap();

        let mut payload = RelayPayload::new();
        payload.add_text_field("caption", "hello");
        payload
            .add_video(&path.to_string_lossy(), "video")
            .await
            .unwrap();

        assert_eq!(payload.files.len(), 1);
        assert_eq!(payload.files[0].0, "clip.mp4");
        assert_eq!(payload.files[0].2, "video/mp4");
        assert!(payload.build_form().is_ok());
    }

    #[tokio::test]
    async fn test_payload_missing_video() {
        let mut payload = RelayPayload::new();
        assert!(payload.add_video("missing.mp4", "video").await.is_err());
    }
}
