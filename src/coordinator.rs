use chrono::NaiveDateTime;
use std::path::Path;

use crate::errors::AppResult;
use crate::models::PublishJob;
use crate::platforms::PlatformPublisher;
use crate::schedule_store::ScheduleStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub due: usize,
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Publishes due jobs to every configured platform. A job is marked
/// published only when all platforms succeed; otherwise it stays pending and
/// is retried whole on the next pass, so a platform that already succeeded
/// may receive the video twice.
pub struct PublishCoordinator {
    store: ScheduleStore,
    publishers: Vec<Box<dyn PlatformPublisher>>,
}

impl PublishCoordinator {
    pub fn new(store: ScheduleStore, publishers: Vec<Box<dyn PlatformPublisher>>) -> Self {
        Self { store, publishers }
    }

    pub async fn run_once(&self, now: NaiveDateTime) -> AppResult<PublishReport> {
        let due = self.store.due_jobs(now)?;
        let mut report = PublishReport {
            due: due.len(),
            ..PublishReport::default()
        };

        if due.is_empty() {
            log::info!("No video due for publication at {}", now.format("%Y-%m-%d %H:%M"));
            return Ok(report);
        }

        log::info!("{} videos due for publication", due.len());

        for (index, job) in due {
            if !Path::new(&job.video_file).is_file() {
                log::error!("Video file not found, skipping: {}", job.video_file);
                report.skipped += 1;
                continue;
            }

            log::info!("Publishing video: {}", job.title);

            if self.publish_everywhere(&job).await {
                self.store.mark_published(index)?;
                log::info!("Video {} published on every platform", job.video_file);
                report.published += 1;
            } else {
                log::warn!(
                    "Video {} left unpublished, it will be retried on the next pass",
                    job.video_file
                );
                report.failed += 1;
            }
        }

        Ok(report)
    }

    /// Every publisher is called even after an earlier one fails.
    async fn publish_everywhere(&self, job: &PublishJob) -> bool {
        let mut all_succeeded = true;

        for publisher in &self.publishers {
            let platform = publisher.platform();
            if publisher.publish(job).await {
                log::info!("{}: published {}", platform, job.video_file);
            } else {
                log::error!("{}: failed to publish {}", platform, job.video_file);
                all_succeeded = false;
            }
        }

        all_succeeded
    }
}
