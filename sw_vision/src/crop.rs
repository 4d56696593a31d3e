//! ABOUTME: Subject crop extraction with context margin and transport sizing
//! ABOUTME: Cuts the tracked region out of full-resolution frames for alert artifacts

use crate::{BoundingBox, Frame};
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};

/// Configuration for crop extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropConfig {
    /// Context margin around the subject box, as a percentage of its size
    pub margin_percent: f64,
    /// Crops are widened/heightened to at least this many pixels per side
    pub min_size: u32,
    /// Crops wider than this are downscaled for transport, keeping aspect
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

/// Cut the subject region out of a frame with context margin.
///
/// The box is grown by `margin_percent` on each side, widened to `min_size`
/// if the subject is small, clamped to the frame, and finally downscaled to
/// `max_width` when the result is too large to send.
pub fn extract_crop(frame: &Frame, bbox: &BoundingBox, config: &CropConfig) -> RgbImage {
    let (fw, fh) = (frame.width(), frame.height());
    let margin_x = (bbox.width as f64 * config.margin_percent / 100.0).round() as u32;
    let margin_y = (bbox.height as f64 * config.margin_percent / 100.0).round() as u32;
    let mut region = bbox.expand(margin_x, margin_y, fw, fh);

    if region.width < config.min_size {
        region = widen_centered(region, config.min_size, fw, true);
    }
    if region.height < config.min_size {
        region = widen_centered(region, config.min_size, fh, false);
    }
    let region = region.clamp_to(fw, fh);

    let crop = imageops::crop_imm(frame.pixels(), region.x, region.y, region.width, region.height)
        .to_image();

    if crop.width() > config.max_width {
        let scale = config.max_width as f64 / crop.width() as f64;
        let new_h = ((crop.height() as f64 * scale).round() as u32).max(1);
        imageops::resize(&crop, config.max_width, new_h, imageops::FilterType::Triangle)
    } else {
        crop
    }
}

/// Grow one axis of the region to `target`, keeping it centered and inside
/// the frame
fn widen_centered(region: BoundingBox, target: u32, limit: u32, horizontal: bool) -> BoundingBox {
    let target = target.min(limit);
    let (pos, len) = if horizontal {
        (region.x, region.width)
    } else {
        (region.y, region.height)
    };
    let grow = target - len;
    let new_pos = pos.saturating_sub(grow / 2).min(limit - target);
    if horizontal {
        BoundingBox::new(new_pos, region.y, target, region.height)
    } else {
        BoundingBox::new(region.x, new_pos, region.width, target)
    }
}
