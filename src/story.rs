use async_trait::async_trait;
use rand::seq::IndexedRandom;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Duration;

use crate::config::StorySettings;
use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;
use crate::uploader::retry::{retry_with_fixed_pause, Sleeper};

/// A generated conversation script, as consumed by the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryDocument {
    pub metadata: StoryMetadata,
    pub messages: Vec<Value>,
    /// Renderer-only fields (`destination`, `voice_mapping`, `audio`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoryDocument {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write `<dir>/<metadata.name>.json` and return its path.
    pub fn save(&self, dir: &Path) -> AppResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.metadata.name));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        log::info!("Story saved: {}", path.display());
        Ok(path)
    }

    /// Make the name file-safe and unique by suffixing a Unix timestamp.
    pub fn stamp_name(&mut self, timestamp: i64) -> AppResult<()> {
        let base = if self.metadata.name.trim().is_empty() {
            "story".to_string()
        } else {
            InputValidator::sanitize_filename(&self.metadata.name)?
        };
        self.metadata.name = format!("{}_{}", base, timestamp);
        Ok(())
    }
}

/// Produces one story document on disk and returns its path.
#[async_trait]
pub trait StoryGenerator: Send + Sync {
    async fn generate(&self) -> AppResult<PathBuf>;
}

/// Parse a model reply into a story: strip code fences, keep the outermost
/// `{...}` block, and retry once with trailing commas removed.
pub fn extract_story_json(raw: &str) -> AppResult<StoryDocument> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(AppError::StoryGeneration("Model response is empty".to_string()));
    }

    let block = Regex::new(r"(?s)\{.*\}")
        .map_err(|e| AppError::Internal(e.to_string()))?
        .find(cleaned)
        .map(|m| m.as_str())
        .ok_or_else(|| {
            log::debug!("Full model response: {}", cleaned);
            AppError::StoryGeneration("No JSON block found in model response".to_string())
        })?;

    let value: Value = match serde_json::from_str(block) {
        Ok(value) => value,
        Err(_) => {
            let trailing_commas = Regex::new(r",\s*([}\]])")
                .map_err(|e| AppError::Internal(e.to_string()))?;
            let fixed = trailing_commas.replace_all(block, "$1");
            let value = serde_json::from_str(&fixed).map_err(|e| {
                AppError::StoryGeneration(format!("Model returned malformed JSON: {}", e))
            })?;
            log::info!("JSON fixed and parsed successfully");
            value
        }
    };

    for field in ["metadata", "messages"] {
        if value.get(field).is_none() {
            return Err(AppError::StoryGeneration(format!(
                "Missing required field: {}",
                field
            )));
        }
    }

    serde_json::from_value(value)
        .map_err(|e| AppError::StoryGeneration(format!("Unexpected story shape: {}", e)))
}

/// Generator backed by an Ollama-compatible `/generate` endpoint.
pub struct OllamaStoryGenerator {
    client: Client,
    settings: StorySettings,
    stories_dir: PathBuf,
    sleeper: Arc<dyn Sleeper>,
}

struct Cast {
    theme: String,
    character: String,
    voice1: String,
    voice2: String,
}

const NARRATOR: &str = "Me";

impl OllamaStoryGenerator {
    pub fn new(
        settings: StorySettings,
        stories_dir: PathBuf,
        sleeper: Arc<dyn Sleeper>,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            settings,
            stories_dir,
            sleeper,
        })
    }

    fn pick_cast(&self) -> AppResult<Cast> {
        let mut rng = rand::rng();

        let theme = self
            .settings
            .themes
            .choose(&mut rng)
            .cloned()
            .ok_or_else(|| AppError::Config("story.themes cannot be empty".to_string()))?;

        let characters: Vec<&String> = self.settings.voice_mapping.keys().collect();
        let character = characters
            .choose(&mut rng)
            .map(|c| c.to_string())
            .ok_or_else(|| AppError::Config("story.voice_mapping cannot be empty".to_string()))?;

        let voice1 = self.settings.voice_mapping[&character]
            .choose(&mut rng)
            .cloned()
            .unwrap_or_default();

        let mut all_voices: Vec<&String> = self.settings.voice_mapping.values().flatten().collect();
        all_voices.sort();
        all_voices.dedup();
        let voice2 = all_voices
            .choose(&mut rng)
            .map(|v| v.to_string())
            .unwrap_or_default();

        Ok(Cast {
            theme,
            character,
            voice1,
            voice2,
        })
    }

    fn prompts(cast: &Cast) -> (String, String) {
        let system = "You write stories for short vertical videos.\n\
            Produce a text-message conversation between two people that tells a story.\n\
            Keep it short (20 to 25 messages), gripping and suited to social media.\n\
            Reply ONLY with the requested JSON, with no text before or after it."
            .to_string();

        let mut voice_mapping = Map::new();
        voice_mapping.insert(cast.character.clone(), json!(cast.voice1));
        voice_mapping.insert(NARRATOR.to_string(), json!(cast.voice2));

        let template = json!({
            "metadata": {
                "name": "Story_Name",
                "description": "Catchy description of the story",
                "tags": ["#sms", "#story", format!("#{}", cast.theme)],
            },
            "destination": { "name": cast.character, "avatar": "avatar.png" },
            "voice_mapping": voice_mapping,
            "audio": "background.mp3",
            "messages": [
                { "sender": cast.character, "text": "First message" },
                { "sender": NARRATOR, "text": "Reply" },
            ],
        });

        let user = format!(
            "Write a story on the theme \"{theme}\" between {character} and {narrator}.\n\n\
             Output format (20-25 messages in total):\n{template}\n\n\
             Constraints:\n\
             - The story is told only through text messages.\n\
             - The second character is always \"{narrator}\"; {character} never calls them \"{narrator}\".\n\
             - Keep sentences short and give the story a strong, memorable ending.\n\
             - The name must not contain spaces.",
            theme = cast.theme,
            character = cast.character,
            narrator = NARRATOR,
            template = serde_json::to_string_pretty(&template).unwrap_or_default(),
        );

        (system, user)
    }

    async fn generate_once(&self) -> AppResult<PathBuf> {
        let cast = self.pick_cast()?;
        log::info!("Generating story with theme: {}", cast.theme);
        log::info!("Characters: {} and {}", cast.character, NARRATOR);

        let (system, prompt) = Self::prompts(&cast);
        let url = format!("{}/generate", self.settings.api_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "model": self.settings.model,
                "prompt": prompt,
                "system": system,
                "stream": false,
                "options": { "temperature": 0.8, "num_predict": 2000 },
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let text = body.get("response").and_then(Value::as_str).unwrap_or("");

        let mut story = extract_story_json(text)?;
        story.stamp_name(chrono::Utc::now().timestamp())?;
        story.save(&self.stories_dir)
    }
}

#[async_trait]
impl StoryGenerator for OllamaStoryGenerator {
    async fn generate(&self) -> AppResult<PathBuf> {
        retry_with_fixed_pause(
            "Story generation",
            self.settings.max_attempts,
            Duration::from_secs(self.settings.retry_pause_secs),
            self.sleeper.as_ref(),
            |_| self.generate_once(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::TokioSleeper;

    const REPLY: &str = r##"Sure! Here it is:
```json
{
  "metadata": {"name": "The Last Call", "description": "Nobody hangs up", "tags": ["#sms", "#mystery",]},
  "destination": {"name": "Emma", "avatar": "avatar.png"},
  "messages": [{"sender": "Emma", "text": "Are you there?"},],
}
```"##;

    #[test]
    fn test_extract_handles_fences_and_trailing_commas() {
        let story = extract_story_json(REPLY).unwrap();
        assert_eq!(story.metadata.name, "The Last Call");
        assert_eq!(story.metadata.tags, vec!["#sms", "#mystery"]);
        assert_eq!(story.messages.len(), 1);
        assert!(story.extra.contains_key("destination"));
    }

    #[test]
    fn test_extract_rejects_missing_fields() {
        let result = extract_story_json(r#"{"metadata": {"name": "x"}}"#);
        assert!(matches!(result, Err(AppError::StoryGeneration(_))));
    }

    #[test]
    fn test_extract_rejects_prose() {
        assert!(extract_story_json("I cannot help with that.").is_err());
        assert!(extract_story_json("   ").is_err());
    }

    #[test]
    fn test_stamp_name_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut story = extract_story_json(REPLY).unwrap();
        story.stamp_name(1712345678).unwrap();

        assert_eq!(story.metadata.name, "The_Last_Call_1712345678");
        let path = story.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("The_Last_Call_1712345678.json"));

        let reloaded = StoryDocument::load(&path).unwrap();
        assert_eq!(reloaded.metadata.description.as_deref(), Some("Nobody hangs up"));
        assert!(reloaded.extra.contains_key("destination"));
    }

    #[test]
    fn test_prompts_mention_cast() {
        let generator = OllamaStoryGenerator::new(
            StorySettings::default(),
            PathBuf::from("stories"),
            Arc::new(TokioSleeper),
        )
        .unwrap();
        let cast = generator.pick_cast().unwrap();
        let (_, user) = OllamaStoryGenerator::prompts(&cast);

        assert!(user.contains(&cast.theme));
        assert!(user.contains(&cast.character));
        assert!(StorySettings::default().themes.contains(&cast.theme));
    }
}
