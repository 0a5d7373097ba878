use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Started,
    Uploading,
    Completed,
    Failed,
}

/// Bookkeeping for a single resumable transfer.
#[derive(Debug)]
pub struct UploadSession {
    pub id: Uuid,
    pub file_name: String,
    pub status: SessionStatus,
    pub bytes_sent: u64,
    pub total_bytes: u64,
    /// Transient failures seen so far; never reset by a successful chunk
    pub failed_attempts: u32,
    started_at: Instant,
}

impl UploadSession {
    pub fn new(file_name: impl Into<String>) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            status: SessionStatus::Started,
            bytes_sent: 0,
            total_bytes: 0,
            failed_attempts: 0,
            started_at: Instant::now(),
        };
        log::info!("Upload session {} started for {}", session.id, session.file_name);
        session
    }

    pub fn progress_percent(&self) -> u32 {
        if self.total_bytes == 0 {
            return 0;
        }
        ((self.bytes_sent as f64 / self.total_bytes as f64) * 100.0).min(100.0) as u32
    }

    pub fn record_progress(&mut self, bytes_sent: u64, total_bytes: u64) {
        self.status = SessionStatus::Uploading;
        self.bytes_sent = bytes_sent;
        self.total_bytes = total_bytes;
        log::info!(
            "Progress: {} uploaded {}% ({}/{} bytes)",
            self.file_name,
            self.progress_percent(),
            bytes_sent,
            total_bytes
        );
    }

    /// Count a transient failure and return the new total.
    pub fn record_transient_failure(&mut self) -> u32 {
        self.failed_attempts += 1;
        self.failed_attempts
    }

    pub fn mark_completed(&mut self, remote_id: &str) {
        self.status = SessionStatus::Completed;
        self.bytes_sent = self.total_bytes;
        log::info!(
            "Session {} completed in {:.1}s: {} -> {}",
            self.id,
            self.started_at.elapsed().as_secs_f64(),
            self.file_name,
            remote_id
        );
    }

    pub fn mark_failed(&mut self, reason: &str) {
        self.status = SessionStatus::Failed;
        log::error!(
            "Session {} failed after {} retries at {}%: {}",
            self.id,
            self.failed_attempts,
            self.progress_percent(),
            reason
        );
    }
}
