//! Publishing adapters, one per supported platform.

pub mod automation;
pub mod tiktok;
pub mod youtube;

use async_trait::async_trait;

use crate::config::Config;
use crate::errors::AppResult;
use crate::models::{Platform, PublishJob};

pub use automation::AutomationPublisher;
pub use tiktok::TikTokPublisher;
pub use youtube::YouTubePublisher;

/// Pushes one job's video to one platform. Failures are logged by the
/// publisher and reported as `false`; they never propagate.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    fn platform(&self) -> Platform;

    async fn publish(&self, job: &PublishJob) -> bool;
}

/// Build a publisher for every platform enabled in `config`, in config order.
pub fn build_publishers(config: &Config) -> AppResult<Vec<Box<dyn PlatformPublisher>>> {
    let mut publishers: Vec<Box<dyn PlatformPublisher>> = Vec::new();

    for platform in &config.platforms {
        let publisher: Box<dyn PlatformPublisher> = match platform {
            Platform::YouTube => Box::new(YouTubePublisher::new(config.youtube.clone())),
            Platform::Instagram => {
                Box::new(AutomationPublisher::instagram(config.instagram.clone()))
            }
            Platform::TikTok => Box::new(TikTokPublisher::new(config.tiktok.clone())?),
        };
        publishers.push(publisher);
    }

    log::debug!(
        "Publishing to: {}",
        config
            .platforms
            .iter()
            .map(Platform::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(publishers)
}
