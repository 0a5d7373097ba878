use async_trait::async_trait;
use std::future::Future;
use tokio::time::Duration;

use crate::errors::AppResult;

/// HTTP statuses worth retrying during a chunked upload.
pub const RETRYABLE_STATUS_CODES: [u16; 4] = [500, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Upper bound of the sleep before retry number `attempt`: `base * 2^attempt`.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// `random(0,1) * 2^attempt` seconds with the default base delay.
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        self.backoff_ceiling(attempt).mul_f64(rand::random::<f64>())
    }
}

pub fn is_retryable_status(status_code: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status_code)
}

/// Suspension point used by every retry loop, swappable in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `operation` up to `max_attempts` times with a fixed pause between
/// attempts. Returns the last error when every attempt fails, or the first
/// permanent one.
pub async fn retry_with_fixed_pause<T, F, Fut>(
    operation_name: &str,
    max_attempts: u32,
    pause: Duration,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> AppResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        log::info!("{}: attempt {}/{}", operation_name, attempt, max_attempts);

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_permanent() => {
                log::error!("{} failed permanently: {}", operation_name, e);
                return Err(e);
            }
            Err(e) if attempt < max_attempts => {
                log::warn!(
                    "{} failed on attempt {}/{}: {}",
                    operation_name,
                    attempt,
                    max_attempts,
                    e
                );
                sleeper.sleep(pause).await;
                attempt += 1;
            }
            Err(e) => {
                log::error!("{}: all {} attempts failed", operation_name, max_attempts);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::AppError;
    use std::sync::Mutex;

    /// Records requested sleeps instead of waiting.
    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub sleeps: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn total(&self) -> Duration {
            self.sleeps.lock().unwrap().iter().sum()
        }

        pub fn count(&self) -> usize {
            self.sleeps.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [500, 502, 503, 504] {
            assert!(is_retryable_status(status));
        }
        for status in [400, 401, 403, 404, 429, 501] {
            assert!(!is_retryable_status(status));
        }
    }

    #[test]
    fn test_backoff_stays_under_ceiling() {
        let config = RetryConfig::default();
        for attempt in 1..=10 {
            let ceiling = Duration::from_secs(2u64.pow(attempt));
            assert_eq!(config.backoff_ceiling(attempt), ceiling);
            for _ in 0..20 {
                assert!(config.jittered_backoff(attempt) <= ceiling);
            }
        }
    }

    #[tokio::test]
    async fn test_fixed_pause_retry_succeeds_on_third_attempt() {
        let sleeper = RecordingSleeper::default();
        let result = retry_with_fixed_pause(
            "story generation",
            3,
            Duration::from_secs(2),
            &sleeper,
            |attempt| async move {
                if attempt < 3 {
                    Err(AppError::StoryGeneration("empty response".to_string()))
                } else {
                    Ok(attempt)
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(*sleeper.sleeps.lock().unwrap(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn test_fixed_pause_retry_gives_up() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let result: AppResult<()> = retry_with_fixed_pause(
            "story generation",
            3,
            Duration::from_secs(2),
            &sleeper,
            |_| {
                calls += 1;
                async { Err(AppError::StoryGeneration("no JSON".to_string())) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 3);
        assert_eq!(sleeper.count(), 2);
    }

    #[tokio::test]
    async fn test_fixed_pause_retry_stops_on_permanent_error() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let result: AppResult<()> = retry_with_fixed_pause(
            "story generation",
            3,
            Duration::from_secs(2),
            &sleeper,
            |_| {
                calls += 1;
                async { Err(AppError::Config("stories_dir is not writable".to_string())) }
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::Config(_))));
        assert_eq!(calls, 1);
        assert_eq!(sleeper.count(), 0);
    }
}
