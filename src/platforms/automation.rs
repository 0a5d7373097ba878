use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use super::PlatformPublisher;
use crate::config::AutomationSettings;
use crate::errors::{AppError, AppResult};
use crate::models::{Platform, PublishJob};
use crate::security::InputValidator;

/// Posts through an external browser-automation command that receives
/// `--file <path> --caption <text>`. Credentials are read from the
/// environment and handed to the child unchanged.
pub struct AutomationPublisher {
    platform: Platform,
    settings: AutomationSettings,
    username_var: &'static str,
    password_var: &'static str,
}

impl AutomationPublisher {
    pub fn new(
        platform: Platform,
        settings: AutomationSettings,
        username_var: &'static str,
        password_var: &'static str,
    ) -> Self {
        Self {
            platform,
            settings,
            username_var,
            password_var,
        }
    }

    pub fn instagram(settings: AutomationSettings) -> Self {
        Self::new(
            Platform::Instagram,
            settings,
            "INSTAGRAM_USERNAME",
            "INSTAGRAM_PASSWORD",
        )
    }

    pub fn check_credentials(&self) -> AppResult<()> {
        InputValidator::require_env(self.platform.as_str(), self.username_var)?;
        InputValidator::require_env(self.platform.as_str(), self.password_var)?;
        Ok(())
    }

    /// Validate, then run the automation command to completion.
    pub async fn post(&self, file: &str, caption: &str) -> AppResult<()> {
        InputValidator::validate_video_file(file)?;
        self.check_credentials()?;
        self.run_command(file, caption).await
    }

    async fn run_command(&self, file: &str, caption: &str) -> AppResult<()> {
        let platform = self.platform.as_str();
        let (program, leading_args) = self.settings.command.split_first().ok_or_else(|| {
            AppError::Config(format!("{}.command cannot be empty", platform))
        })?;

        let mut command = Command::new(program);
        command
            .args(leading_args)
            .arg("--file")
            .arg(file)
            .arg("--caption")
            .arg(caption)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        log::info!("Posting {} to {} via {}", file, self.platform, program);

        let seconds = self.settings.timeout_secs;
        let output = timeout(Duration::from_secs(seconds), command.output())
            .await
            .map_err(|_| AppError::AutomationTimeout {
                platform: platform.to_string(),
                seconds,
            })?
            .map_err(|e| {
                AppError::automation(platform, format!("failed to start {}: {}", program, e))
            })?;

        if output.status.success() {
            log::info!("{} post completed for {}", self.platform, file);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");
        Err(AppError::automation(
            platform,
            format!("{} exited with {}: {}", program, output.status, tail),
        ))
    }
}

#[async_trait]
impl PlatformPublisher for AutomationPublisher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(&self, job: &PublishJob) -> bool {
        match self.post(&job.video_file, &job.caption()).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("{} upload failed for {}: {}", self.platform, job.video_file, e);
                false
            }
        }
    }
}
