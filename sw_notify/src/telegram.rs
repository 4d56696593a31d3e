//! ABOUTME: Telegram Bot API adapter: sendMessage, sendPhoto, sendAnimation, sendVideo
//! ABOUTME: Multipart uploads with bounded retry; bot token never appears in logs

use crate::retry::{is_retryable, RetryConfig};
use crate::{NotificationError, Notifier, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Configuration for the Telegram adapter
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    pub token: String,
    /// Target chat
    pub chat_id: String,
    /// API base URL, overridable for tests
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            chat_id: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

// Token stays out of Debug output
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Telegram Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Telegram notification adapter
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    config: TelegramConfig,
    retry: RetryConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    async fn upload(
        &self,
        method: &str,
        field: &'static str,
        caption: &str,
        path: &Path,
        mime: &str,
    ) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());

        // Multipart forms are consumed on send, so each attempt rebuilds one
        self.call_with_retry(method, || {
            let part = Part::bytes(bytes.clone())
                .file_name(file_name.clone())
                .mime_str(mime)?;
            Ok(Form::new()
                .text("chat_id", self.config.chat_id.clone())
                .text("caption", caption.to_string())
                .part(field, part))
        })
        .await
    }

    /// Run one API call with bounded exponential backoff
    async fn call_with_retry<F>(&self, method: &str, make_form: F) -> Result<()>
    where
        F: Fn() -> Result<Form>,
    {
        let mut attempt = 0u32;
        loop {
            let result = self.execute(method, make_form()?).await;

            match result {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(method, attempt = attempt + 1, "Delivered after retry");
                    }
                    return Ok(());
                }
                Err(e) if is_retryable(&e) && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        method,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Telegram call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if is_retryable(&e) => {
                    return Err(NotificationError::RetryExhausted(format!(
                        "{} failed after {} attempts: {}",
                        method,
                        attempt + 1,
                        e
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute(&self, method: &str, form: Form) -> Result<()> {
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let body: ApiResponse = response.json().await?;
        if !body.ok {
            return Err(NotificationError::TelegramApi(
                body.description
                    .unwrap_or_else(|| "unknown API rejection".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip(self, text))]
    async fn send_message(&self, text: &str) -> Result<()> {
        self.call_with_retry("sendMessage", || {
            Ok(Form::new()
                .text("chat_id", self.config.chat_id.clone())
                .text("text", text.to_string()))
        })
        .await?;
        info!("Message delivered");
        Ok(())
    }

    #[instrument(skip(self, caption))]
    async fn send_photo(&self, caption: &str, path: &Path) -> Result<()> {
        self.upload("sendPhoto", "photo", caption, path, "image/jpeg")
            .await?;
        info!(path = %path.display(), "Photo delivered");
        Ok(())
    }

    #[instrument(skip(self, caption))]
    async fn send_animation(&self, caption: &str, path: &Path) -> Result<()> {
        self.upload("sendAnimation", "animation", caption, path, "image/gif")
            .await?;
        info!(path = %path.display(), "Animation delivered");
        Ok(())
    }

    #[instrument(skip(self, caption))]
    async fn send_video(&self, caption: &str, path: &Path) -> Result<()> {
        self.upload("sendVideo", "video", caption, path, "video/mp4")
            .await?;
        info!(path = %path.display(), "Video delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
