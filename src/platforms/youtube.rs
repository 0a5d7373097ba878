use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::PlatformPublisher;
use crate::config::YouTubeSettings;
use crate::errors::{AppError, AppResult};
use crate::models::{Platform, PublishJob};
use crate::security::InputValidator;
use crate::uploader::youtube_client::{VideoMetadata, YouTubeClient};
use crate::uploader::{ResumableUploader, RetryConfig, TokioSleeper};

const TOKEN_ENV: &str = "YOUTUBE_ACCESS_TOKEN";

/// Everything needed for one YouTube upload.
#[derive(Debug, Clone)]
pub struct YouTubeUpload {
    pub file: String,
    pub metadata: VideoMetadata,
    pub thumbnail: Option<PathBuf>,
    pub playlist_id: Option<String>,
}

pub struct YouTubePublisher {
    settings: YouTubeSettings,
    uploader: ResumableUploader,
}

impl YouTubePublisher {
    pub fn new(settings: YouTubeSettings) -> Self {
        let uploader = ResumableUploader::new(
            RetryConfig::with_max_retries(settings.max_retries),
            Arc::new(TokioSleeper),
        );
        Self { settings, uploader }
    }

    /// Upload request for a scheduled job using the configured defaults.
    pub fn upload_for_job(&self, job: &PublishJob) -> YouTubeUpload {
        YouTubeUpload {
            file: job.video_file.clone(),
            metadata: VideoMetadata {
                title: job.title.clone(),
                description: job.description.clone(),
                tags: job.keyword_list(),
                category_id: self.settings.category_id.clone(),
                privacy_status: self.settings.privacy_status.clone(),
            },
            thumbnail: self.settings.thumbnail.clone(),
            playlist_id: self.settings.playlist_id.clone(),
        }
    }

    /// Upload the video and return its id. Thumbnail and playlist steps are
    /// best-effort and never fail an upload that already succeeded.
    pub async fn upload(&self, upload: &YouTubeUpload) -> AppResult<String> {
        InputValidator::validate_video_file(&upload.file)?;
        let access_token = load_access_token(&self.settings.token_file)?;

        let client = YouTubeClient::new(access_token, self.settings.chunk_size_mb * 1024 * 1024)?;
        let mut request = client
            .video_upload(Path::new(&upload.file), &upload.metadata)
            .await?;

        log::info!("Uploading {} to YouTube", upload.file);
        let video_id = self.uploader.upload(&mut request).await?;
        log::info!(
            "Video uploaded successfully: https://www.youtube.com/watch?v={}",
            video_id
        );

        if let Some(thumbnail) = &upload.thumbnail {
            let result = match InputValidator::validate_thumbnail(&thumbnail.to_string_lossy()) {
                Ok(()) => client.set_thumbnail(&video_id, thumbnail).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                log::warn!("Could not set thumbnail for {}: {}", video_id, e);
            }
        }

        if let Some(playlist_id) = &upload.playlist_id {
            if let Err(e) = client.add_to_playlist(&video_id, playlist_id).await {
                log::warn!("Could not add {} to playlist {}: {}", video_id, playlist_id, e);
            }
        }

        Ok(video_id)
    }
}

#[async_trait]
impl PlatformPublisher for YouTubePublisher {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    async fn publish(&self, job: &PublishJob) -> bool {
        match self.upload(&self.upload_for_job(job)).await {
            Ok(_) => true,
            Err(e) => {
                log::error!("YouTube upload failed for {}: {}", job.video_file, e);
                false
            }
        }
    }
}

/// OAuth access token from the environment, else from the stored token file.
pub fn load_access_token(token_file: &Path) -> AppResult<String> {
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }

    if !token_file.exists() {
        return Err(AppError::missing_credentials("youtube", TOKEN_ENV));
    }

    let raw = std::fs::read_to_string(token_file)?;
    let stored: serde_json::Value = serde_json::from_str(&raw)?;
    ["access_token", "token"]
        .iter()
        .find_map(|key| stored.get(*key).and_then(|v| v.as_str()))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::missing_credentials("youtube", TOKEN_ENV))
}
