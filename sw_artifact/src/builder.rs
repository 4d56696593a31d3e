//! ABOUTME: Renders motion events into animated GIFs, MP4s, and alert photos
//! ABOUTME: Decimates long events, normalizes crop sizes, shells out to ffmpeg for video

use crate::store::CropStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{imageops, Delay, DynamicImage, Frame as GifFrame, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sw_core::{Error, Result};
use sw_pipeline::{AlertArtifact, AlertArtifactBuilder, MotionEvent};
use sw_proc::{run, CommandSpec};
use tracing::{debug, info, instrument, warn};

/// Configuration for artifact generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Root directory for generated artifacts
    pub output_dir: PathBuf,
    /// Maximum frames in an animation; longer events are decimated
    pub max_frames: usize,
    /// Animation frame rate
    pub fps: u32,
    pub video: VideoConfig,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            max_frames: 16,
            fps: 4,
            video: VideoConfig::default(),
        }
    }
}

/// Configuration for MP4 rendition via ffmpeg
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub enabled: bool,
    pub program: String,
    /// x264 constant rate factor
    pub crf: u32,
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

/// Builds the files an alert ships with: an animated GIF of the event's
/// crops, optionally an MP4 rendition, and a representative photo.
///
/// The GIF is the primary artifact; the MP4 and photo are best-effort and
/// their failures only downgrade the alert.
pub struct ArtifactBuilder {
    config: ArtifactConfig,
    store: CropStore,
}

impl ArtifactBuilder {
    pub fn new(config: ArtifactConfig, store: CropStore) -> Self {
        Self { config, store }
    }

    fn event_dir(&self, at: DateTime<Utc>) -> PathBuf {
        self.config
            .output_dir
            .join("events")
            .join(at.format("%Y-%m-%d").to_string())
    }

    /// Normalize crops to one even-sided canvas so every animation frame
    /// has identical dimensions (required by both GIF and yuv420p).
    fn render_uniform(&self, event: &MotionEvent, indices: &[usize]) -> Vec<RgbaImage> {
        let target_w = even(indices
            .iter()
            .map(|&i| event.frames[i].crop.width())
            .max()
            .unwrap_or(2));
        let target_h = even(indices
            .iter()
            .map(|&i| event.frames[i].crop.height())
            .max()
            .unwrap_or(2));

        indices
            .iter()
            .map(|&i| {
                let crop = &event.frames[i].crop;
                let scale = (target_w as f64 / crop.width() as f64)
                    .min(target_h as f64 / crop.height() as f64)
                    .min(1.0);
                let w = ((crop.width() as f64 * scale) as u32).max(1);
                let h = ((crop.height() as f64 * scale) as u32).max(1);
                let resized = if (w, h) == crop.dimensions() {
                    DynamicImage::ImageRgb8(crop.clone()).to_rgba8()
                } else {
                    let scaled =
                        imageops::resize(crop, w, h, imageops::FilterType::Triangle);
                    DynamicImage::ImageRgb8(scaled).to_rgba8()
                };
                let mut canvas = RgbaImage::from_pixel(
                    target_w,
                    target_h,
                    image::Rgba([0, 0, 0, 255]),
                );
                let x = (target_w - resized.width()) / 2;
                let y = (target_h - resized.height()) / 2;
                imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
                canvas
            })
            .collect()
    }

    async fn write_mp4(
        &self,
        frames: &[RgbaImage],
        path: &Path,
    ) -> Result<()> {
        let scratch = tempfile::tempdir()
            .map_err(|e| Error::Artifact(format!("Failed to create scratch dir: {}", e)))?;

        for (i, frame) in frames.iter().enumerate() {
            let frame_path = scratch.path().join(format!("frame_{:04}.png", i));
            DynamicImage::ImageRgba8(frame.clone())
                .save(&frame_path)
                .map_err(|e| Error::Artifact(format!("Failed to write scratch frame: {}", e)))?;
        }

        let spec = CommandSpec::new(self.config.video.program.clone().into())
            .args([
                "-y",
                "-framerate",
                &self.config.fps.to_string(),
                "-i",
                "frame_%04d.png",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-crf",
                &self.config.video.crf.to_string(),
                "-an",
                &path.to_string_lossy(),
            ])
            .cwd(scratch.path())
            .timeout(Duration::from_secs(self.config.video.timeout_secs));

        let result = run(spec).await?;
        if !result.success() {
            return Err(Error::Artifact(format!(
                "ffmpeg exited with code {}: {}",
                result.exit_code().unwrap_or(-1),
                result.stderr.trim()
            )));
        }
        // Scratch frames removed when `scratch` drops, success or not
        Ok(())
    }
}

#[async_trait]
impl AlertArtifactBuilder for ArtifactBuilder {
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn build(&self, event: &MotionEvent) -> Result<AlertArtifact> {
        if event.frames.is_empty() {
            return Err(Error::Artifact(
                "Cannot build artifacts from an event with no frames".to_string(),
            ));
        }

        let indices = decimate_indices(event.frames.len(), self.config.max_frames);
        debug!(
            total = event.frames.len(),
            kept = indices.len(),
            "Frames selected for animation"
        );
        let rendered = self.render_uniform(event, &indices);

        let dir = self.event_dir(event.started_at);
        tokio::fs::create_dir_all(&dir).await?;
        let gif_path = dir.join(format!("{}.gif", event.id));

        let gif_frames = rendered.clone();
        let gif_target = gif_path.clone();
        let fps = self.config.fps;
        tokio::task::spawn_blocking(move || write_gif(&gif_frames, fps, &gif_target))
            .await
            .map_err(|e| Error::Artifact(format!("GIF encode task failed: {}", e)))??;
        info!(path = %gif_path.display(), frames = rendered.len(), "Animation written");

        let video = if self.config.video.enabled {
            let mp4_path = dir.join(format!("{}.mp4", event.id));
            match self.write_mp4(&rendered, &mp4_path).await {
                Ok(()) => {
                    info!(path = %mp4_path.display(), "Video written");
                    Some(mp4_path)
                }
                Err(e) => {
                    warn!(error = %e, "Video rendition failed, alert ships without it");
                    None
                }
            }
        } else {
            None
        };

        let (photo, crops) = match self.store.save_event(event).await {
            Ok(stored) => (Some(stored.photo), stored.frames),
            Err(e) => {
                warn!(error = %e, "Crop storage failed, alert ships without a photo");
                (None, Vec::new())
            }
        };

        Ok(AlertArtifact {
            animation: gif_path,
            video,
            photo,
            crops,
        })
    }
}

fn even(v: u32) -> u32 {
    let v = v.max(2);
    v + (v % 2)
}

/// Pick evenly spaced frame indices when an event holds more frames than
/// the animation should carry. Always includes index 0; order preserved.
fn decimate_indices(len: usize, max: usize) -> Vec<usize> {
    if len <= max || max == 0 {
        return (0..len).collect();
    }
    (0..max)
        .map(|i| {
            let idx = (i as f64 * len as f64 / max as f64).round() as usize;
            idx.min(len - 1)
        })
        .collect()
}

/// Encode frames as a looping GIF with a per-frame delay of 1000/fps ms
fn write_gif(frames: &[RgbaImage], fps: u32, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut encoder = GifEncoder::new(file);
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| Error::Artifact(format!("Failed to set GIF repeat: {}", e)))?;

    let delay = Delay::from_numer_denom_ms(1000, fps.max(1));
    for frame in frames {
        let gif_frame = GifFrame::from_parts(frame.clone(), 0, 0, delay);
        encoder
            .encode_frame(gif_frame)
            .map_err(|e| Error::Artifact(format!("Failed to encode GIF frame: {}", e)))?;
    }
    Ok(())
}
