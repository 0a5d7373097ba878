use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use super::progress_tracker::UploadSession;
use super::retry::{is_retryable_status, RetryConfig, Sleeper};
use crate::errors::{AppError, AppResult};

/// Result of sending one chunk of a resumable upload.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Progress { bytes_sent: u64, total_bytes: u64 },
    Complete(serde_json::Value),
}

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// Local file reads, request building and undecodable replies.
    #[error("{0}")]
    Fatal(String),
}

impl ChunkError {
    /// Connection-level failures and 500/502/503/504 are worth another try.
    pub fn is_transient(&self) -> bool {
        match self {
            ChunkError::Http { status, .. } => is_retryable_status(*status),
            ChunkError::Transport(_) => true,
            ChunkError::Fatal(_) => false,
        }
    }
}

impl From<reqwest::Error> for ChunkError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return ChunkError::Http {
                status: status.as_u16(),
                body: error.to_string(),
            };
        }

        if error.is_connect() || error.is_timeout() || error.is_request() || error.is_body() {
            ChunkError::Transport(error.to_string())
        } else {
            ChunkError::Fatal(error.to_string())
        }
    }
}

impl From<std::io::Error> for ChunkError {
    fn from(error: std::io::Error) -> Self {
        ChunkError::Fatal(format!("local I/O error: {}", error))
    }
}

/// A resumable transfer that advances one chunk per call. A failed call
/// leaves the confirmed offset untouched, so the next call resumes from the
/// last byte the server acknowledged.
#[async_trait]
pub trait ChunkedRequest: Send {
    fn describe(&self) -> String;

    async fn next_chunk(&mut self) -> Result<ChunkOutcome, ChunkError>;
}

pub struct ResumableUploader {
    retry_config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl ResumableUploader {
    pub fn new(retry_config: RetryConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            retry_config,
            sleeper,
        }
    }

    /// Drive `request` to completion and return the remote `id`.
    pub async fn upload(&self, request: &mut dyn ChunkedRequest) -> AppResult<String> {
        let mut session = UploadSession::new(request.describe());

        loop {
            let error = match request.next_chunk().await {
                Ok(ChunkOutcome::Progress {
                    bytes_sent,
                    total_bytes,
                }) => {
                    session.record_progress(bytes_sent, total_bytes);
                    continue;
                }
                Ok(ChunkOutcome::Complete(response)) => {
                    return match response.get("id").and_then(|id| id.as_str()) {
                        Some(id) => {
                            session.mark_completed(id);
                            Ok(id.to_string())
                        }
                        None => {
                            session.mark_failed("response has no id");
                            Err(AppError::MissingRemoteId)
                        }
                    };
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                session.mark_failed(&error.to_string());
                return Err(match error {
                    ChunkError::Http { status, body } => AppError::UploadRejected { status, body },
                    ChunkError::Transport(message) | ChunkError::Fatal(message) => {
                        AppError::Internal(message)
                    }
                });
            }

            let attempt = session.record_transient_failure();
            if attempt > self.retry_config.max_retries {
                session.mark_failed("no longer attempting to retry");
                return Err(AppError::RetriesExhausted {
                    attempts: attempt,
                    last_error: error.to_string(),
                });
            }

            let delay = self.retry_config.jittered_backoff(attempt);
            log::warn!(
                "A retriable error occurred ({}), sleeping {:.2}s before retry {}/{}",
                error,
                delay.as_secs_f64(),
                attempt,
                self.retry_config.max_retries
            );
            self.sleeper.sleep(delay).await;
        }
    }
}
