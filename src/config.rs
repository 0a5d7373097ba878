use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{AppError, AppResult};
use crate::models::{hhmm, Platform};

const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schedule_file: PathBuf,
    pub stories_dir: PathBuf,
    pub videos_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Fixed time of day (`HH:MM`) assigned to every scheduled job
    pub publish_time: String,
    pub catch_up_missed: bool,
    pub replenish_threshold: usize,
    pub replenish_batch_size: u32,
    pub publish_cron: String,
    pub replenish_cron: String,
    pub poll_interval_secs: u64,
    pub item_pause_secs: u64,
    pub log_retention_days: u32,
    pub platforms: Vec<Platform>,
    pub youtube: YouTubeSettings,
    pub instagram: AutomationSettings,
    pub tiktok: TikTokSettings,
    pub story: StorySettings,
    pub renderer: RendererSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeSettings {
    pub category_id: String,
    pub privacy_status: String,
    pub token_file: PathBuf,
    pub chunk_size_mb: u64,
    pub max_retries: u32,
    pub thumbnail: Option<PathBuf>,
    pub playlist_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    /// Program and leading arguments; `--file` and `--caption` are appended
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TikTokSettings {
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub use_alternative: bool,
    pub alternative_webhook: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorySettings {
    pub api_url: String,
    pub model: String,
    pub themes: Vec<String>,
    /// Character name -> candidate voices
    pub voice_mapping: BTreeMap<String, Vec<String>>,
    pub max_attempts: u32,
    pub retry_pause_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub command: Vec<String>,
    pub ffmpeg: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule_file: PathBuf::from("schedule.json"),
            stories_dir: PathBuf::from("stories"),
            videos_dir: PathBuf::from("videos"),
            logs_dir: PathBuf::from("logs"),
            publish_time: "18:00".to_string(),
            catch_up_missed: false,
            replenish_threshold: 3,
            replenish_batch_size: 10,
            publish_cron: "0 0 * * * *".to_string(),
            replenish_cron: "0 0 0 * * *".to_string(),
            poll_interval_secs: 60,
            item_pause_secs: 2,
            log_retention_days: 30,
            platforms: vec![Platform::YouTube, Platform::Instagram, Platform::TikTok],
            youtube: YouTubeSettings::default(),
            instagram: AutomationSettings {
                command: vec!["instagram-upload".to_string()],
                timeout_secs: 600,
            },
            tiktok: TikTokSettings::default(),
            story: StorySettings::default(),
            renderer: RendererSettings::default(),
        }
    }
}

impl Default for YouTubeSettings {
    fn default() -> Self {
        Self {
            category_id: "22".to_string(),
            privacy_status: "public".to_string(),
            token_file: PathBuf::from("token.json"),
            chunk_size_mb: 8,
            max_retries: 10,
            thumbnail: None,
            playlist_id: None,
        }
    }
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 600,
        }
    }
}

impl Default for TikTokSettings {
    fn default() -> Self {
        Self {
            command: vec!["tiktok-upload".to_string()],
            timeout_secs: 600,
            use_alternative: false,
            alternative_webhook: None,
        }
    }
}

impl TikTokSettings {
    pub fn automation(&self) -> AutomationSettings {
        AutomationSettings {
            command: self.command.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

impl Default for StorySettings {
    fn default() -> Self {
        let mut voice_mapping = BTreeMap::new();
        voice_mapping.insert(
            "Emma".to_string(),
            vec!["en-US-JennyNeural".to_string(), "en-US-AriaNeural".to_string()],
        );
        voice_mapping.insert(
            "Lucas".to_string(),
            vec!["en-US-GuyNeural".to_string(), "en-US-DavisNeural".to_string()],
        );

        Self {
            api_url: "http://localhost:11434/api".to_string(),
            model: "llama3.2:3b".to_string(),
            themes: vec![
                "mystery".to_string(),
                "horror".to_string(),
                "romance".to_string(),
            ],
            voice_mapping,
            max_attempts: 3,
            retry_pause_secs: 2,
        }
    }
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            command: vec!["node".to_string(), "capture.js".to_string()],
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

impl Config {
    pub fn publish_time(&self) -> AppResult<chrono::NaiveTime> {
        hhmm::parse(&self.publish_time)
            .map_err(|_| AppError::validation("publish_time", "Must be formatted as HH:MM"))
    }
}

/// Resolve the config file: explicit path, then `./config.json`, then the
/// user config directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> AppResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join("story-publisher");
    Ok(config_dir.join(DEFAULT_CONFIG_FILE))
}

pub fn load_config(path: &Path) -> AppResult<Config> {
    let config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        serde_json::from_str::<Config>(&config_str).map_err(|e| {
            AppError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?
    } else {
        log::info!(
            "No configuration at {}, using defaults",
            path.display()
        );
        Config::default()
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn save_config(config: &Config, path: &Path) -> AppResult<()> {
    validate_config(config)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    // Create backup of existing config
    if path.exists() {
        let backup_path = path.with_extension("json.bak");
        if let Err(e) = fs::copy(path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str)?;

    log::info!("Configuration saved to {}", path.display());
    Ok(())
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    config.publish_time()?;

    for (field, expression) in [
        ("publish_cron", &config.publish_cron),
        ("replenish_cron", &config.replenish_cron),
    ] {
        if cron::Schedule::from_str(expression).is_err() {
            return Err(AppError::validation(field, "Invalid cron expression"));
        }
    }

    if config.poll_interval_secs == 0 {
        return Err(AppError::validation("poll_interval_secs", "Must be greater than 0"));
    }

    if config.platforms.is_empty() {
        return Err(AppError::validation("platforms", "At least one platform is required"));
    }

    if config.youtube.max_retries > 10 {
        return Err(AppError::validation("youtube.max_retries", "Must be 10 or fewer"));
    }

    if config.youtube.chunk_size_mb == 0 {
        return Err(AppError::validation("youtube.chunk_size_mb", "Must be greater than 0"));
    }

    let valid_privacy = ["public", "private", "unlisted"];
    if !valid_privacy.contains(&config.youtube.privacy_status.as_str()) {
        return Err(AppError::validation(
            "youtube.privacy_status",
            "Must be 'public', 'private', or 'unlisted'",
        ));
    }

    if config.story.max_attempts == 0 {
        return Err(AppError::validation("story.max_attempts", "Must be at least 1"));
    }

    if config.renderer.command.is_empty() {
        return Err(AppError::validation("renderer.command", "Renderer command cannot be empty"));
    }

    Ok(())
}

/// Remove files older than `days` from a directory; used to prune old logs.
pub fn cleanup_old_files(directory: &Path, days: u32) -> AppResult<usize> {
    if !directory.exists() {
        return Ok(0);
    }

    let cutoff_time = std::time::SystemTime::now()
        - std::time::Duration::from_secs((days as u64) * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() {
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    if modified < cutoff_time {
                        if let Err(e) = fs::remove_file(&path) {
                            log::warn!("Failed to remove old file {}: {}", path.display(), e);
                        } else {
                            log::debug!("Removed old file: {}", path.display());
                            removed += 1;
                        }
                    }
                }
            }
        }
    }

    Ok(removed)
}
