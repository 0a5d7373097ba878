use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::RendererSettings;
use crate::errors::{AppError, AppResult};
use crate::story::StoryDocument;

/// Turns a saved story into a video file.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, story_path: &Path, story: &StoryDocument) -> AppResult<PathBuf>;
}

/// What the renderer left in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedOutput {
    Mp4(PathBuf),
    Webm(PathBuf),
}

/// Look for `<name>.mp4` first, then `<name>.webm`.
pub fn probe_output(videos_dir: &Path, name: &str) -> Option<RenderedOutput> {
    let mp4 = videos_dir.join(format!("{}.mp4", name));
    if mp4.is_file() {
        return Some(RenderedOutput::Mp4(mp4));
    }

    let webm = videos_dir.join(format!("{}.webm", name));
    if webm.is_file() {
        return Some(RenderedOutput::Webm(webm));
    }

    None
}

/// Runs the configured renderer command (`node capture.js <story>` by
/// default) and normalizes its output to mp4 with ffmpeg.
pub struct CommandRenderer {
    settings: RendererSettings,
    videos_dir: PathBuf,
}

impl CommandRenderer {
    pub fn new(settings: RendererSettings, videos_dir: PathBuf) -> Self {
        Self {
            settings,
            videos_dir,
        }
    }

    async fn run_renderer(&self, story_path: &Path) -> AppResult<()> {
        let (program, args) = self
            .settings
            .command
            .split_first()
            .ok_or_else(|| AppError::Config("renderer.command cannot be empty".to_string()))?;

        let status = Command::new(program)
            .args(args)
            .arg(story_path)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| AppError::Render(format!("failed to start {}: {}", program, e)))?;

        if !status.success() {
            return Err(AppError::Render(format!("{} exited with {}", program, status)));
        }
        Ok(())
    }

    /// Transcode to mp4; on failure the webm is kept and returned.
    async fn transcode(&self, webm: PathBuf) -> PathBuf {
        let mp4 = webm.with_extension("mp4");
        log::info!("Converting {} -> {}", webm.display(), mp4.display());

        let result = Command::new(&self.settings.ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(&webm)
            .args(["-c:v", "libx264", "-c:a", "aac", "-strict", "experimental"])
            .arg(&mp4)
            .stdin(Stdio::null())
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => {
                log::info!("Conversion succeeded: {}", mp4.display());
                mp4
            }
            Ok(output) => {
                log::error!(
                    "ffmpeg exited with {}, keeping {}",
                    output.status,
                    webm.display()
                );
                webm
            }
            Err(e) => {
                log::error!("Could not run ffmpeg ({}), keeping {}", e, webm.display());
                webm
            }
        }
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, story_path: &Path, story: &StoryDocument) -> AppResult<PathBuf> {
        if !story_path.is_file() {
            return Err(AppError::file_not_found(&story_path.to_string_lossy()));
        }

        log::info!("Rendering video for {}", story_path.display());
        self.run_renderer(story_path).await?;

        match probe_output(&self.videos_dir, &story.metadata.name) {
            Some(RenderedOutput::Mp4(path)) => {
                log::info!("Video created: {}", path.display());
                Ok(path)
            }
            Some(RenderedOutput::Webm(path)) => {
                log::info!("Video created as webm: {}", path.display());
                Ok(self.transcode(path).await)
            }
            None => Err(AppError::Render(format!(
                "no {}.mp4 or {}.webm in {}",
                story.metadata.name,
                story.metadata.name,
                self.videos_dir.display()
            ))),
        }
    }
}
