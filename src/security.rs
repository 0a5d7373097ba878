use regex::Regex;
use std::path::Path;

use crate::errors::{AppError, AppResult};

const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mov", "avi"];

pub struct InputValidator;

impl InputValidator {
    pub fn validate_file_path(path: &str) -> AppResult<()> {
        if path.trim().is_empty() {
            return Err(AppError::validation("file_path", "File path cannot be empty"));
        }

        let path_obj = Path::new(path);

        if !path_obj.exists() {
            return Err(AppError::file_not_found(path));
        }

        if !path_obj.is_file() {
            return Err(AppError::validation("file_path", "Path is not a file"));
        }

        Ok(())
    }

    /// Cheap precondition checked before any upload attempt.
    pub fn validate_video_file(path: &str) -> AppResult<()> {
        Self::validate_file_path(path)?;

        let extension = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());

        match extension {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            _ => Err(AppError::invalid_file_type(path)),
        }
    }

    pub fn validate_thumbnail(path: &str) -> AppResult<()> {
        Self::validate_file_path(path)?;

        // YouTube rejects custom thumbnails above 2MB
        const MAX_THUMBNAIL_SIZE: u64 = 2 * 1024 * 1024;
        if std::fs::metadata(path)?.len() > MAX_THUMBNAIL_SIZE {
            return Err(AppError::validation("thumbnail", "Thumbnail exceeds 2MB"));
        }

        // Verify it's actually an image by decoding its header
        image::image_dimensions(path)?;

        Ok(())
    }

    /// Read a required secret from the environment.
    pub fn require_env(platform: &str, variable: &str) -> AppResult<String> {
        match std::env::var(variable) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(AppError::missing_credentials(platform, variable)),
        }
    }

    /// Turn a story name into something safe to use as a file stem.
    pub fn sanitize_filename(filename: &str) -> AppResult<String> {
        let unsafe_chars = Regex::new(r#"[<>:"/\\|?*\x00-\x1f\s]"#)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let sanitized = unsafe_chars.replace_all(filename.trim(), "_");

        if sanitized.len() > 120 {
            Ok(sanitized.chars().take(120).collect())
        } else {
            Ok(sanitized.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn test_validate_video_file_missing() {
        let result = InputValidator::validate_video_file("definitely_missing.mp4");
        assert!(matches!(result, Err(AppError::FileNotFound { .. })));
    }

    #[test]
    fn test_validate_video_file_extensions() {
        let dir = tempfile::tempdir().unwrap();

        for (name, accepted) in [
            ("clip.mp4", true),
            ("clip.MOV", true),
            ("clip.avi", true),
            ("clip.webm", false),
            ("clip", false),
        ] {
            let path = dir.path().join(name);
            File::create(&path).unwrap().write_all(b"data").unwrap();
            let result = InputValidator::validate_video_file(&path.to_string_lossy());
            assert_eq!(result.is_ok(), accepted, "unexpected result for {}", name);
        }
    }

    #[test]
    fn test_validate_thumbnail_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thumb.jpg");
        File::create(&path).unwrap().write_all(b"not an image").unwrap();

        assert!(InputValidator::validate_thumbnail(&path.to_string_lossy()).is_err());
    }

    #[test]
    fn test_require_env_missing() {
        let result = InputValidator::require_env("tiktok", "STORY_PUBLISHER_TEST_UNSET_VAR");
        assert!(matches!(result, Err(AppError::MissingCredentials { .. })));
    }

    #[test]
    fn test_sanitize_filename() {
        let safe = InputValidator::sanitize_filename(" The Last: Call/2 ").unwrap();
        assert_eq!(safe, "The_Last__Call_2");

        let long = InputValidator::sanitize_filename(&"a".repeat(200)).unwrap();
        assert_eq!(long.len(), 120);
    }
}
