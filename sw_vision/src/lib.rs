//! ABOUTME: Pure-Rust motion detection, template tracking, and crop extraction
//! ABOUTME: Domain types (Frame, BoundingBox) shared across the capture pipeline

use chrono::{DateTime, Utc};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

pub mod comparator;
pub mod corruption;
pub mod crop;
pub mod tracker;

pub use comparator::{CompareOutcome, ComparatorConfig, FrameComparator};
pub use corruption::CorruptionFilter;
pub use crop::{extract_crop, CropConfig};
pub use tracker::{TrackMethod, TrackOutcome, TrackerConfig, TurtleTracker};

// Re-export image types for downstream crates and benchmarks
pub use image;

/// An immutable camera capture: full-resolution pixels plus capture metadata.
///
/// Frames are never mutated once captured; the pipeline holds at most the
/// current and previous frame outside an active event buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: RgbImage,
    captured_at: DateTime<Utc>,
    source: String,
}

impl Frame {
    pub fn new(pixels: RgbImage, captured_at: DateTime<Utc>, source: impl Into<String>) -> Self {
        Self {
            pixels,
            captured_at,
            source: source.into(),
        }
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Single-channel intensity view of the frame
    pub fn luma(&self) -> GrayImage {
        image::DynamicImage::ImageRgb8(self.pixels.clone()).to_luma8()
    }
}

/// Axis-aligned rectangle in full-resolution pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Whether the box lies entirely within a frame of the given dimensions
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.right() <= frame_width && self.bottom() <= frame_height
    }

    /// Clamp the box so that it lies entirely within the frame
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Self {
        let x = self.x.min(frame_width.saturating_sub(1));
        let y = self.y.min(frame_height.saturating_sub(1));
        Self {
            x,
            y,
            width: self.width.min(frame_width - x),
            height: self.height.min(frame_height - y),
        }
    }

    /// Scale coordinates by independent horizontal/vertical factors
    pub fn scale(&self, sx: f64, sy: f64) -> Self {
        Self {
            x: (self.x as f64 * sx).round() as u32,
            y: (self.y as f64 * sy).round() as u32,
            width: ((self.width as f64 * sx).round() as u32).max(1),
            height: ((self.height as f64 * sy).round() as u32).max(1),
        }
    }

    /// Grow the box symmetrically, clamped to the frame
    pub fn expand(&self, margin_x: u32, margin_y: u32, frame_width: u32, frame_height: u32) -> Self {
        let x = self.x.saturating_sub(margin_x);
        let y = self.y.saturating_sub(margin_y);
        let right = (self.right() + margin_x).min(frame_width);
        let bottom = (self.bottom() + margin_y).min(frame_height);
        Self {
            x,
            y,
            width: right.saturating_sub(x).max(1),
            height: bottom.saturating_sub(y).max(1),
        }
    }

    /// Exponential smoothing: blend toward `target` with the given weight.
    ///
    /// `weight` is the share of the new observation (e.g. 0.7 favors the
    /// target); the remainder is kept from `self` to damp frame-to-frame
    /// jitter in downstream crops.
    pub fn smooth_toward(&self, target: &BoundingBox, weight: f64) -> Self {
        let keep = 1.0 - weight;
        let blend = |old: u32, new: u32| -> u32 {
            (old as f64 * keep + new as f64 * weight).round() as u32
        };
        Self {
            x: blend(self.x, target.x),
            y: blend(self.y, target.y),
            width: blend(self.width, target.width).max(1),
            height: blend(self.height, target.height).max(1),
        }
    }
}

/// Synthetic frame generators for tests and benchmarks
pub mod utils {
    use super::*;
    use image::Rgb;

    /// Uniform frame at a single intensity
    pub fn solid_frame(width: u32, height: u32, intensity: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([intensity, intensity, intensity]))
    }

    /// Dark gray frame with a bright square at the given position
    pub fn frame_with_square(
        width: u32,
        height: u32,
        square_x: u32,
        square_y: u32,
        square_size: u32,
        intensity: u8,
    ) -> RgbImage {
        let mut img = solid_frame(width, height, 64);
        for y in square_y..(square_y + square_size).min(height) {
            for x in square_x..(square_x + square_size).min(width) {
                img.put_pixel(x, y, Rgb([intensity, intensity, intensity]));
            }
        }
        img
    }

    /// Sequence of frames with a square stepping right each frame.
    /// Differencing consecutive frames of a flat square changes only the
    /// leading and trailing strips; with a step smaller than the square the
    /// strips tie on area and the trailing strip wins deterministically.
    pub fn moving_square_sequence(
        width: u32,
        height: u32,
        frames: usize,
        start_x: u32,
        square_y: u32,
        square_size: u32,
        step: u32,
    ) -> Vec<RgbImage> {
        (0..frames)
            .map(|i| {
                frame_with_square(
                    width,
                    height,
                    start_x + step * i as u32,
                    square_y,
                    square_size,
                    200,
                )
            })
            .collect()
    }

    /// Deterministic pseudo-random textured frame (varied intensities)
    pub fn textured_frame(width: u32, height: u32, seed: u64) -> RgbImage {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        RgbImage::from_fn(width, height, |_, _| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            // Keep intensities in a mid band so stddev stays plausible
            let v = 64 + ((state >> 33) % 128) as u8;
            Rgb([v, v, v])
        })
    }

    /// Wrap raw pixels into a Frame with a synthetic timestamp
    pub fn frame_at(pixels: RgbImage, offset_secs: i64) -> Frame {
        let base = chrono::DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        Frame::new(
            pixels,
            base + chrono::Duration::seconds(offset_secs),
            "mock-camera",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_clamp() {
        let bbox = BoundingBox::new(300, 200, 100, 100);
        let clamped = bbox.clamp_to(320, 240);
        assert!(clamped.fits_within(320, 240));
        assert_eq!(clamped.x, 300);
        assert_eq!(clamped.width, 20);
        assert_eq!(clamped.height, 40);
    }

    #[test]
    fn test_bbox_scale_roundtrip() {
        let bbox = BoundingBox::new(10, 20, 30, 40);
        let up = bbox.scale(4.0, 4.0);
        assert_eq!(up, BoundingBox::new(40, 80, 120, 160));
        let down = up.scale(0.25, 0.25);
        assert_eq!(down, bbox);
    }

    #[test]
    fn test_bbox_expand_clamps_at_edges() {
        let bbox = BoundingBox::new(2, 2, 10, 10);
        let expanded = bbox.expand(5, 5, 100, 100);
        assert_eq!(expanded.x, 0);
        assert_eq!(expanded.y, 0);
        assert_eq!(expanded.right(), 17);
        assert!(expanded.fits_within(100, 100));
    }

    #[test]
    fn test_bbox_smoothing_favors_new_observation() {
        let old = BoundingBox::new(100, 100, 50, 50);
        let new = BoundingBox::new(110, 100, 50, 50);
        let smoothed = old.smooth_toward(&new, 0.7);
        assert_eq!(smoothed.x, 107);
        assert_eq!(smoothed.width, 50);
    }

    #[test]
    fn test_frame_luma_dimensions() {
        let frame = utils::frame_at(utils::solid_frame(64, 48, 128), 0);
        let gray = frame.luma();
        assert_eq!(gray.dimensions(), (64, 48));
        assert_eq!(gray.get_pixel(10, 10).0[0], 128);
    }
}
