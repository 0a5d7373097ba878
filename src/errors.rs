use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid file type: {path}. Only mp4, mov and avi videos are supported.")]
    InvalidFileType { path: String },

    #[error("Missing credentials for {platform}: {variable} is not set")]
    MissingCredentials { platform: String, variable: String },

    #[error("Upload rejected with HTTP {status}: {body}")]
    UploadRejected { status: u16, body: String },

    #[error("Upload abandoned after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Upload finished but the response carried no video id")]
    MissingRemoteId,

    #[error("Story generation failed: {0}")]
    StoryGeneration(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("{platform} automation failed: {message}")]
    Automation { platform: String, message: String },

    #[error("{platform} automation timed out after {seconds}s")]
    AutomationTimeout { platform: String, seconds: u64 },

    #[error("No scheduled job at index {index}")]
    JobNotFound { index: usize },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn file_not_found(path: &str) -> Self {
        Self::FileNotFound {
            path: path.to_string(),
        }
    }

    pub fn invalid_file_type(path: &str) -> Self {
        Self::InvalidFileType {
            path: path.to_string(),
        }
    }

    pub fn missing_credentials(platform: &str, variable: &str) -> Self {
        Self::MissingCredentials {
            platform: platform.to_string(),
            variable: variable.to_string(),
        }
    }

    pub fn automation(platform: &str, message: impl Into<String>) -> Self {
        Self::Automation {
            platform: platform.to_string(),
            message: message.into(),
        }
    }

    /// Precondition and logic failures that no amount of retrying fixes.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AppError::FileNotFound { .. }
                | AppError::InvalidFileType { .. }
                | AppError::MissingCredentials { .. }
                | AppError::UploadRejected { .. }
                | AppError::MissingRemoteId
                | AppError::Validation { .. }
                | AppError::Config(_)
        )
    }
}
