use async_trait::async_trait;
use std::sync::Arc;

use super::automation::AutomationPublisher;
use super::PlatformPublisher;
use crate::config::TikTokSettings;
use crate::errors::{AppError, AppResult};
use crate::models::{Platform, PublishJob};
use crate::security::InputValidator;
use crate::uploader::relay_client::{RelayClient, RelayPayload};
use crate::uploader::{RetryConfig, TokioSleeper};

/// TikTok through browser automation, or through a posting relay when the
/// alternative method is selected.
pub struct TikTokPublisher {
    automation: AutomationPublisher,
    relay: RelayClient,
    use_alternative: bool,
    alternative_webhook: Option<String>,
}

impl TikTokPublisher {
    pub fn new(settings: TikTokSettings) -> AppResult<Self> {
        let automation = AutomationPublisher::new(
            Platform::TikTok,
            settings.automation(),
            "TIKTOK_USERNAME",
            "TIKTOK_PASSWORD",
        );
        let relay = RelayClient::new(RetryConfig::with_max_retries(3), Arc::new(TokioSleeper))?;

        Ok(Self {
            automation,
            relay,
            use_alternative: settings.use_alternative,
            alternative_webhook: settings.alternative_webhook,
        })
    }

    pub async fn post(&self, file: &str, caption: &str, alternative: bool) -> AppResult<()> {
        if alternative {
            self.post_via_relay(file, caption).await
        } else {
            self.automation.post(file, caption).await
        }
    }

    async fn post_via_relay(&self, file: &str, caption: &str) -> AppResult<()> {
        InputValidator::validate_video_file(file)?;
        let webhook = self.alternative_webhook.as_deref().ok_or_else(|| {
            AppError::validation(
                "tiktok.alternative_webhook",
                "Alternative upload requires a relay webhook URL",
            )
        })?;

        let mut payload = RelayPayload::new();
        payload.add_text_field("caption", caption);
        payload.add_video(file, "video").await?;

        log::info!("Posting {} to TikTok via relay", file);
        self.relay.send(webhook, &payload).await?;
        log::info!("TikTok relay accepted {}", file);
        Ok(())
    }
}

#[async_trait]
impl PlatformPublisher for TikTokPublisher {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    async fn publish(&self, job: &PublishJob) -> bool {
        match self
            .post(&job.video_file, &job.caption(), self.use_alternative)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log::error!("TikTok upload failed for {}: {}", job.video_file, e);
                false
            }
        }
    }
}
