//! ABOUTME: Bounded exponential backoff for Telegram API calls
//! ABOUTME: Retries transient failures, gives up fast on client errors

use crate::NotificationError;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 250,
            max_delay_ms: 15_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay before the given attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32)) as u64;
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Whether a failure is worth retrying. Rate limits and server-side
/// trouble are transient; other API rejections are not.
pub fn is_retryable(error: &NotificationError) -> bool {
    match error {
        NotificationError::HttpError(e) => {
            e.is_timeout()
                || e.is_connect()
                || e.status().map_or(false, |s| {
                    s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS
                })
        }
        // ok=false in a 200 response is an API rejection, not transience
        NotificationError::TelegramApi(_) => false,
        NotificationError::Io(_) => false,
        NotificationError::SerializationError(_) => false,
        NotificationError::RetryExhausted(_) => false,
    }
}
