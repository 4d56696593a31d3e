//! ABOUTME: Configuration management with validation and environment loading
//! ABOUTME: All monitor settings from defaults, an optional TOML file, and env vars

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use sw_core::{Error, Result};
use validator::Validate;

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    /// "development" or "production", controls log formatting
    pub environment: String,
    #[validate(nested)]
    pub camera: CameraConfig,
    #[validate(nested)]
    pub motion: MotionConfig,
    #[validate(nested)]
    pub tracker: TrackerConfig,
    #[validate(nested)]
    pub events: EventsConfig,
    #[validate(nested)]
    pub crop: CropConfig,
    #[validate(nested)]
    pub artifact: ArtifactConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub telegram: Option<TelegramSection>,
    #[validate(nested)]
    pub runner: RunnerConfig,
}

/// Camera still-capture configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CameraConfig {
    /// Capture command, expected to write one encoded still to stdout
    #[validate(length(min = 1))]
    pub program: String,
    pub args: Vec<String>,
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u64,
    /// Source label used in logs and frame metadata
    #[validate(length(min = 1))]
    pub name: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            program: "rpicam-still".to_string(),
            args: vec![
                "--output".to_string(),
                "-".to_string(),
                "--nopreview".to_string(),
                "--immediate".to_string(),
                "--width".to_string(),
                "1640".to_string(),
                "--height".to_string(),
                "1232".to_string(),
            ],
            timeout_secs: 10,
            name: "terrarium-cam".to_string(),
        }
    }
}

/// Frame comparison configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MotionConfig {
    #[validate(range(min = 32, max = 1920))]
    pub comparison_width: u32,
    #[validate(range(min = 32, max = 1080))]
    pub comparison_height: u32,
    /// Per-pixel grayscale difference threshold
    pub pixel_threshold: u8,
    #[validate(range(min = 0.0, max = 100.0))]
    pub min_change_percent: f64,
    /// Minimum blob area in comparison-resolution pixels
    #[validate(range(min = 1, max = 100000))]
    pub min_blob_area: u32,
    /// Morphology kernel diameter, odd
    #[validate(range(min = 1, max = 31))]
    pub kernel_size: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            comparison_width: 320,
            comparison_height: 240,
            pixel_threshold: 25,
            min_change_percent: 1.0,
            min_blob_area: 200,
            kernel_size: 7,
        }
    }
}

/// Subject tracking configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TrackerConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    pub match_threshold: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub smoothing_weight: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_decay: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_gain: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_floor: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.6,
            smoothing_weight: 0.7,
            confidence_decay: 0.8,
            confidence_gain: 0.1,
            confidence_floor: 0.3,
        }
    }
}

/// Motion event aggregation configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EventsConfig {
    /// Seconds of stillness before an event is considered finished
    #[validate(range(min = 0.5, max = 600.0))]
    pub inactivity_timeout_secs: f64,
    /// Frame cap per event, oldest evicted first
    #[validate(range(min = 1, max = 256))]
    pub max_frames: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 8.0,
            max_frames: 16,
        }
    }
}

/// Subject crop configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CropConfig {
    #[validate(range(min = 0.0, max = 100.0))]
    pub margin_percent: f64,
    #[validate(range(min = 16, max = 1024))]
    pub min_size: u32,
    #[validate(range(min = 64, max = 4096))]
    pub max_width: u32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            margin_percent: 15.0,
            min_size: 64,
            max_width: 640,
        }
    }
}

/// Alert artifact configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ArtifactConfig {
    #[validate(length(min = 1))]
    pub output_dir: String,
    #[validate(range(min = 1, max = 30))]
    pub fps: u32,
    #[validate(nested)]
    pub video: VideoConfig,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            output_dir: "data".to_string(),
            fps: 4,
            video: VideoConfig::default(),
        }
    }
}

/// MP4 rendering configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct VideoConfig {
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub program: String,
    #[validate(range(min = 0, max = 51))]
    pub crf: u32,
    #[validate(range(min = 1, max = 600))]
    pub timeout_secs: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "ffmpeg".to_string(),
            crf: 23,
            timeout_secs: 60,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub path: String,
    /// Detections older than this many days are pruned at startup
    #[validate(range(min = 1, max = 3650))]
    pub retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "shellwatch.db".to_string(),
            retention_days: 90,
        }
    }
}

/// Telegram delivery configuration with secret redaction
#[derive(Clone, Deserialize, Serialize, Validate)]
pub struct TelegramSection {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 1))]
    pub chat_id: String,
}

impl fmt::Debug for TelegramSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSection")
            .field("token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Capture loop configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RunnerConfig {
    #[validate(range(min = 50, max = 60000))]
    pub capture_interval_ms: u64,
    /// Capture pacing while the terrarium is still
    #[validate(range(min = 50, max = 600000))]
    pub idle_interval_ms: u64,
    #[validate(range(min = 1, max = 1000))]
    pub max_consecutive_failures: u32,
    /// Bounded queue between the capture loop and the artifact worker
    #[validate(range(min = 1, max = 64))]
    pub job_queue_depth: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            capture_interval_ms: 500,
            idle_interval_ms: 2000,
            max_consecutive_failures: 30,
            job_queue_depth: 8,
        }
    }
}

impl Config {
    /// Load configuration from defaults, shellwatch.toml if present, and
    /// SHELLWATCH_ environment variables (highest priority)
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        builder = builder
            .set_default("environment", "development")?
            .set_default("camera.program", "rpicam-still")?
            .set_default(
                "camera.args",
                vec![
                    "--output",
                    "-",
                    "--nopreview",
                    "--immediate",
                    "--width",
                    "1640",
                    "--height",
                    "1232",
                ],
            )?
            .set_default("camera.timeout_secs", 10)?
            .set_default("camera.name", "terrarium-cam")?
            .set_default("motion.comparison_width", 320)?
            .set_default("motion.comparison_height", 240)?
            .set_default("motion.pixel_threshold", 25)?
            .set_default("motion.min_change_percent", 1.0)?
            .set_default("motion.min_blob_area", 200)?
            .set_default("motion.kernel_size", 7)?
            .set_default("tracker.match_threshold", 0.6)?
            .set_default("tracker.smoothing_weight", 0.7)?
            .set_default("tracker.confidence_decay", 0.8)?
            .set_default("tracker.confidence_gain", 0.1)?
            .set_default("tracker.confidence_floor", 0.3)?
            .set_default("events.inactivity_timeout_secs", 8.0)?
            .set_default("events.max_frames", 16)?
            .set_default("crop.margin_percent", 15.0)?
            .set_default("crop.min_size", 64)?
            .set_default("crop.max_width", 640)?
            .set_default("artifact.output_dir", "data")?
            .set_default("artifact.fps", 4)?
            .set_default("artifact.video.enabled", true)?
            .set_default("artifact.video.program", "ffmpeg")?
            .set_default("artifact.video.crf", 23)?
            .set_default("artifact.video.timeout_secs", 60)?
            .set_default("database.path", "shellwatch.db")?
            .set_default("database.retention_days", 90)?
            .set_default("runner.capture_interval_ms", 500)?
            .set_default("runner.idle_interval_ms", 2000)?
            .set_default("runner.max_consecutive_failures", 30)?
            .set_default("runner.job_queue_depth", 8)?;

        // Fields whose names contain underscores collide with the env
        // separator, so they get explicit overrides
        if let Ok(token) = std::env::var("SHELLWATCH_TELEGRAM_TOKEN") {
            builder = builder.set_override("telegram.token", token)?;
            let chat_id = std::env::var("SHELLWATCH_TELEGRAM_CHAT_ID").unwrap_or_default();
            builder = builder.set_override("telegram.chat_id", chat_id)?;
        }
        if let Ok(path) = std::env::var("SHELLWATCH_DATABASE_PATH") {
            builder = builder.set_override("database.path", path)?;
        }
        if let Ok(interval) = std::env::var("SHELLWATCH_RUNNER_CAPTURE_INTERVAL_MS") {
            builder = builder.set_override("runner.capture_interval_ms", interval)?;
        }
        if let Ok(timeout) = std::env::var("SHELLWATCH_EVENTS_INACTIVITY_TIMEOUT_SECS") {
            builder = builder.set_override("events.inactivity_timeout_secs", timeout)?;
        }

        if std::path::Path::new("shellwatch.toml").exists() {
            builder = builder.add_source(File::with_name("shellwatch").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("SHELLWATCH")
                .try_parsing(true)
                .separator("_"),
        );

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed
            .validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;

        Ok(parsed)
    }
}
