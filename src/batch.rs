use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use tokio::time::Duration;

use crate::errors::AppResult;
use crate::models::{JobDraft, PublishJob};
use crate::render::Renderer;
use crate::schedule_store::ScheduleStore;
use crate::story::{StoryDocument, StoryGenerator};
use crate::uploader::Sleeper;

const DEFAULT_DESCRIPTION: &str = "Mysterious story generated automatically";
const DEFAULT_TAGS: [&str; 3] = ["#shorts", "#mystery", "#story"];

#[derive(Debug, Default)]
pub struct BatchReport {
    pub requested: u32,
    pub failed: u32,
    pub scheduled: Vec<PublishJob>,
}

/// Generate -> render -> schedule, one item at a time.
pub struct BatchPipeline {
    generator: Box<dyn StoryGenerator>,
    renderer: Box<dyn Renderer>,
    store: ScheduleStore,
    item_pause: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl BatchPipeline {
    pub fn new(
        generator: Box<dyn StoryGenerator>,
        renderer: Box<dyn Renderer>,
        store: ScheduleStore,
        item_pause: Duration,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            generator,
            renderer,
            store,
            item_pause,
            sleeper,
        }
    }

    /// Attempt all `count` items; failures are logged and skipped. Every
    /// produced video is appended in a single store call.
    pub async fn run(&self, count: u32, today: NaiveDate) -> AppResult<BatchReport> {
        log::info!("Starting generation of {} videos", count);

        let mut drafts = Vec::new();
        let mut report = BatchReport {
            requested: count,
            ..BatchReport::default()
        };

        for i in 1..=count {
            log::info!("Generating video {}/{}", i, count);

            match self.produce_item().await {
                Ok(draft) => {
                    drafts.push(draft);
                    if !self.item_pause.is_zero() {
                        self.sleeper.sleep(self.item_pause).await;
                    }
                }
                Err(e) => {
                    log::error!("Item {}/{} failed: {}", i, count, e);
                    report.failed += 1;
                }
            }
        }

        if drafts.is_empty() {
            log::error!("No video could be generated");
            return Ok(report);
        }

        report.scheduled = self.store.append(drafts, today)?;
        log::info!(
            "Batch of {} videos generated and scheduled ({} failed)",
            report.scheduled.len(),
            report.failed
        );
        Ok(report)
    }

    async fn produce_item(&self) -> AppResult<JobDraft> {
        let story_path = self.generator.generate().await?;
        log::info!("Story generated: {}", story_path.display());

        let story = StoryDocument::load(&story_path)?;
        let video = self.renderer.render(&story_path, &story).await?;
        Ok(draft_from_story(&video, &story))
    }

    /// Run a batch when fewer than `threshold` jobs remain unpublished.
    pub async fn replenish_if_needed(
        &self,
        threshold: usize,
        batch_size: u32,
        today: NaiveDate,
    ) -> AppResult<Option<BatchReport>> {
        let unpublished = self.store.unpublished_count()?;
        log::info!("{} videos waiting to be published", unpublished);

        if unpublished >= threshold {
            return Ok(None);
        }

        log::info!(
            "Fewer than {} videos pending, generating {} more",
            threshold,
            batch_size
        );
        self.run(batch_size, today).await.map(Some)
    }
}

/// Schedule metadata for a rendered story. The title comes from the video
/// file stem, which the renderer names after `metadata.name`.
pub fn draft_from_story(video: &Path, story: &StoryDocument) -> JobDraft {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| story.metadata.name.clone());

    let description = story
        .metadata
        .description
        .clone()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    let tags: Vec<String> = if story.metadata.tags.is_empty() {
        DEFAULT_TAGS.iter().map(|t| t.to_string()).collect()
    } else {
        story.metadata.tags.clone()
    };

    JobDraft {
        video_file: video.to_string_lossy().to_string(),
        title: format!("{} #Shorts", stem.replace('_', " ")),
        description: format!("{}\n\n{}", description, tags.join(" ")),
        keywords: tags.join(","),
    }
}
