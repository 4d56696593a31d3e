//! ABOUTME: Frame source that shells out to a camera still command
//! ABOUTME: Decodes JPEG bytes from the command's stdout into Frames

use crate::FrameSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sw_core::{Error, Result};
use sw_proc::{run, CommandSpec};
use sw_vision::Frame;
use tracing::{debug, info, instrument, warn};

/// Configuration for the camera still command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StillCommandConfig {
    /// Program that writes one JPEG still to stdout
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Timeout for a single capture
    pub timeout_secs: u64,
    /// Source name recorded on frames
    pub source_name: String,
}

impl Default for StillCommandConfig {
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
            source_name: "terrarium-cam".to_string(),
        }
    }
}

/// Frame source backed by an external still command.
///
/// Each capture runs the configured program once and decodes the JPEG it
/// writes to stdout. Slow, but a Pi camera still command is the one
/// interface every camera stack on the platform shares.
pub struct StillCommandSource {
    config: StillCommandConfig,
}

impl StillCommandSource {
    pub fn new(config: StillCommandConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StillCommandConfig {
        &self.config
    }

    fn build_command(&self) -> CommandSpec {
        CommandSpec::new(self.config.program.clone().into())
            .args(self.config.args.iter())
            .timeout(Duration::from_secs(self.config.timeout_secs))
    }

    async fn capture_bytes(&self) -> Result<Vec<u8>> {
        let spec = self.build_command();
        let result = run(spec).await?;

        if !result.success() {
            return Err(Error::Capture(format!(
                "Still command {} failed with exit code {}: {}",
                self.config.program,
                result.exit_code().unwrap_or(-1),
                result.stderr.trim()
            )));
        }
        if result.stdout.is_empty() {
            return Err(Error::Capture(format!(
                "Still command {} produced no output",
                self.config.program
            )));
        }
        if result.stdout_truncated {
            warn!("Still command output was truncated, frame may be unreadable");
        }
        Ok(result.stdout)
    }
}

#[async_trait]
impl FrameSource for StillCommandSource {
    #[instrument(skip(self), fields(program = %self.config.program))]
    async fn capture(&self) -> Result<Frame> {
        let bytes = self.capture_bytes().await?;
        debug!(bytes = bytes.len(), "Still captured, decoding");

        let pixels = image::load_from_memory(&bytes)
            .map_err(|e| Error::Capture(format!("Failed to decode still: {}", e)))?
            .to_rgb8();

        Ok(Frame::new(
            pixels,
            chrono::Utc::now(),
            self.config.source_name.clone(),
        ))
    }

    /// One full capture round-trip, including the JPEG decode. The camera
    /// stack failing at startup should stop the service, not retry forever.
    #[instrument(skip(self), fields(program = %self.config.program))]
    async fn validate(&self) -> Result<()> {
        match self.capture().await {
            Ok(frame) => {
                info!(
                    width = frame.width(),
                    height = frame.height(),
                    "Camera validated"
                );
                Ok(())
            }
            Err(e) => Err(Error::Capture(format!(
                "Camera validation failed for {}: {}",
                self.config.program, e
            ))),
        }
    }

    fn name(&self) -> &str {
        &self.config.source_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::io::Cursor;

    fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    fn cat_source(path: &std::path::Path) -> StillCommandSource {
        StillCommandSource::new(StillCommandConfig {
            program: "cat".to_string(),
            args: vec![path.to_string_lossy().to_string()],
            timeout_secs: 5,
            source_name: "fixture-cam".to_string(),
        })
    }

    #[tokio::test]
    async fn test_capture_decodes_jpeg_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.jpg");
        std::fs::write(&path, jpeg_fixture(320, 240)).unwrap();

        let source = cat_source(&path);
        let frame = source.capture().await.expect("capture should succeed");

        assert_eq!(frame.width(), 320);
        assert_eq!(frame.height(), 240);
        assert_eq!(frame.source(), "fixture-cam");
    }

    #[tokio::test]
    async fn test_capture_rejects_garbage_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.jpg");
        std::fs::write(&path, b"not a jpeg at all").unwrap();

        let source = cat_source(&path);
        let result = source.capture().await;
        assert!(matches!(result, Err(Error::Capture(_))));
    }

    #[tokio::test]
    async fn test_capture_fails_on_empty_output() {
        let source = StillCommandSource::new(StillCommandConfig {
            program: "true".to_string(),
            args: vec![],
            timeout_secs: 5,
            source_name: "empty-cam".to_string(),
        });
        let result = source.capture().await;
        assert!(matches!(result, Err(Error::Capture(_))));
    }

    #[tokio::test]
    async fn test_validate_fails_for_missing_program() {
        let source = StillCommandSource::new(StillCommandConfig {
            program: "this_camera_command_does_not_exist".to_string(),
            args: vec![],
            timeout_secs: 2,
            source_name: "missing-cam".to_string(),
        });
        assert!(source.validate().await.is_err());
    }

    #[tokio::test]
    async fn test_capture_fails_on_nonzero_exit() {
        let source = StillCommandSource::new(StillCommandConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
            timeout_secs: 5,
            source_name: "broken-cam".to_string(),
        });
        let result = source.capture().await;
        match result {
            Err(Error::Capture(msg)) => assert!(msg.contains("exit code 3")),
            other => panic!("expected capture error, got {:?}", other.map(|f| f.width())),
        }
    }
}
