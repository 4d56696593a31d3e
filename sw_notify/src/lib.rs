//! ABOUTME: Alert delivery with a Telegram adapter behind a Notifier trait
//! ABOUTME: Own error domain so delivery failures stay distinct from pipeline errors

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub mod retry;
pub mod telegram;

pub use retry::RetryConfig;
pub use telegram::{TelegramConfig, TelegramNotifier};

/// Result type for notification operations
pub type Result<T> = std::result::Result<T, NotificationError>;

/// Errors that can occur during notification operations
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Telegram API error: {0}")]
    TelegramApi(String),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Retry exhausted: {0}")]
    RetryExhausted(String),
}

/// Delivery channel for terrarium alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Plain text message
    async fn send_message(&self, text: &str) -> Result<()>;

    /// Still photo with caption
    async fn send_photo(&self, caption: &str, path: &Path) -> Result<()>;

    /// Animated GIF with caption
    async fn send_animation(&self, caption: &str, path: &Path) -> Result<()>;

    /// MP4 video with caption
    async fn send_video(&self, caption: &str, path: &Path) -> Result<()>;

    /// Adapter name for logs
    fn name(&self) -> &str;
}
