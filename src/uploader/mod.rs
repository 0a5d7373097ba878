// Upload transport: chunked resumable transfers with retry, plus the HTTP
// clients that speak to each remote service.

pub mod progress_tracker;
pub mod relay_client;
pub mod resumable;
pub mod retry;
pub mod youtube_client;

pub use resumable::{ChunkError, ChunkOutcome, ChunkedRequest, ResumableUploader};
pub use retry::{RetryConfig, Sleeper, TokioSleeper};
