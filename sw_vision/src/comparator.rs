//! ABOUTME: Low-resolution frame-difference engine answering "did something move, and where"
//! ABOUTME: Downscale, absdiff, threshold, morphology, and blob extraction on the image crate

use crate::{BoundingBox, Frame};
use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Configuration for frame comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparatorConfig {
    /// Width of the comparison resolution
    pub comparison_width: u32,
    /// Height of the comparison resolution
    pub comparison_height: u32,
    /// Per-pixel absolute difference needed to count as changed
    pub diff_threshold: u8,
    /// Percentage of changed pixels needed before contour extraction runs
    pub change_percent_threshold: f64,
    /// Minimum blob area (in comparison-resolution pixels) to count as the subject
    pub min_blob_area: u32,
    /// Side length of the elliptical morphology kernel (odd)
    pub morph_kernel_size: u32,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            comparison_width: 320,
            comparison_height: 240,
            diff_threshold: 25,
            change_percent_threshold: 1.0,
            min_blob_area: 200,
            morph_kernel_size: 7,
        }
    }
}

/// Result of comparing two frames
#[derive(Debug, Clone)]
pub struct CompareOutcome {
    /// Whether motion above all thresholds was found
    pub motion_detected: bool,
    /// Bounding box of the largest moving blob, in full-resolution coordinates
    pub bbox: Option<BoundingBox>,
    /// Percentage of changed pixels at comparison resolution
    pub change_percent: f64,
}

impl CompareOutcome {
    fn still() -> Self {
        Self {
            motion_detected: false,
            bbox: None,
            change_percent: 0.0,
        }
    }
}

/// Connected region of changed pixels
struct Blob {
    area: u32,
    bbox: BoundingBox,
}

/// Frame-difference motion detector.
///
/// Speed over quality is intentional: frames are downscaled with nearest
/// neighbor before differencing, since this stage only needs to answer
/// whether something moved and roughly where.
pub struct FrameComparator {
    config: ComparatorConfig,
    /// Elliptical structuring element as (dx, dy) offsets
    kernel: Vec<(i32, i32)>,
}

impl FrameComparator {
    pub fn new(config: ComparatorConfig) -> Self {
        let kernel = elliptical_kernel(config.morph_kernel_size.max(1));
        Self { config, kernel }
    }

    pub fn config(&self) -> &ComparatorConfig {
        &self.config
    }

    /// Downscale a frame to comparison resolution and convert to intensity.
    /// Frames already at or below the comparison size pass through unscaled.
    pub fn prepare(&self, frame: &Frame) -> GrayImage {
        let gray = frame.luma();
        if gray.width() <= self.config.comparison_width
            && gray.height() <= self.config.comparison_height
        {
            return gray;
        }
        imageops::resize(
            &gray,
            self.config.comparison_width,
            self.config.comparison_height,
            imageops::FilterType::Nearest,
        )
    }

    /// Compare two full-resolution frames
    pub fn compare(&self, current: &Frame, previous: &Frame) -> CompareOutcome {
        let cur = self.prepare(current);
        let prev = self.prepare(previous);
        self.compare_prepared(&cur, &prev, current.width(), current.height())
    }

    /// Compare two frames already prepared to comparison resolution.
    /// `full_width`/`full_height` are the original frame dimensions used to
    /// scale the resulting bounding box back up.
    pub fn compare_prepared(
        &self,
        current: &GrayImage,
        previous: &GrayImage,
        full_width: u32,
        full_height: u32,
    ) -> CompareOutcome {
        if current.dimensions() != previous.dimensions() {
            warn!(
                current = ?current.dimensions(),
                previous = ?previous.dimensions(),
                "Comparison frames differ in size, skipping"
            );
            return CompareOutcome::still();
        }

        let (w, h) = current.dimensions();
        let total_pixels = (w as u64 * h as u64) as f64;

        // Absolute difference, binary threshold
        let mut mask = GrayImage::new(w, h);
        for (m, (c, p)) in mask
            .pixels_mut()
            .zip(current.pixels().zip(previous.pixels()))
        {
            let diff = c.0[0].abs_diff(p.0[0]);
            m.0[0] = if diff > self.config.diff_threshold {
                255
            } else {
                0
            };
        }

        // Open then close: drop single-pixel noise, keep blob shape
        let mask = morph_close(&morph_open(&mask, &self.kernel), &self.kernel);

        let changed = mask.pixels().filter(|p| p.0[0] > 0).count() as f64;
        let change_percent = changed / total_pixels * 100.0;

        debug!(change_percent, "Frame difference computed");

        if change_percent <= self.config.change_percent_threshold {
            return CompareOutcome {
                motion_detected: false,
                bbox: None,
                change_percent,
            };
        }

        let blobs = extract_blobs(&mask);
        let largest = blobs
            .into_iter()
            .filter(|b| b.area >= self.config.min_blob_area)
            // Strictly-greater keeps the first blob found on an exact tie
            .fold(None::<Blob>, |best, b| match best {
                Some(prev) if prev.area >= b.area => Some(prev),
                _ => Some(b),
            });

        match largest {
            Some(blob) => {
                let sx = full_width as f64 / w as f64;
                let sy = full_height as f64 / h as f64;
                let bbox = blob.bbox.scale(sx, sy).clamp_to(full_width, full_height);
                debug!(
                    change_percent,
                    area = blob.area,
                    ?bbox,
                    "Motion detected"
                );
                CompareOutcome {
                    motion_detected: true,
                    bbox: Some(bbox),
                    change_percent,
                }
            }
            None => CompareOutcome {
                motion_detected: false,
                bbox: None,
                change_percent,
            },
        }
    }
}

/// Offsets of an elliptical structuring element with the given side length
fn elliptical_kernel(size: u32) -> Vec<(i32, i32)> {
    let r = (size / 2) as i32;
    let rf = r.max(1) as f64;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            let d = (dx as f64 / rf).powi(2) + (dy as f64 / rf).powi(2);
            if d <= 1.0 {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// Erosion: a pixel survives only if every in-bounds kernel offset is set
fn erode(mask: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    let (w, h) = mask.dimensions();
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            if mask.get_pixel(x, y).0[0] == 0 {
                continue;
            }
            let all_set = kernel.iter().all(|&(dx, dy)| {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                    true
                } else {
                    mask.get_pixel(nx as u32, ny as u32).0[0] > 0
                }
            });
            if all_set {
                out.put_pixel(x, y, image::Luma([255]));
            }
        }
    }
    out
}

/// Dilation: a pixel is set if any in-bounds kernel offset is set
fn dilate(mask: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    let (w, h) = mask.dimensions();
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let any_set = kernel.iter().any(|&(dx, dy)| {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                nx >= 0
                    && ny >= 0
                    && nx < w as i32
                    && ny < h as i32
                    && mask.get_pixel(nx as u32, ny as u32).0[0] > 0
            });
            if any_set {
                out.put_pixel(x, y, image::Luma([255]));
            }
        }
    }
    out
}

fn morph_open(mask: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    dilate(&erode(mask, kernel), kernel)
}

fn morph_close(mask: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    erode(&dilate(mask, kernel), kernel)
}

/// Connected-component labeling (8-connectivity) over a binary mask,
/// returning blobs in scan order.
fn extract_blobs(mask: &GrayImage) -> Vec<Blob> {
    let (w, h) = mask.dimensions();
    let mut visited = vec![false; (w * h) as usize];
    let mut blobs = Vec::new();
    let idx = |x: u32, y: u32| (y * w + x) as usize;

    for y in 0..h {
        for x in 0..w {
            if visited[idx(x, y)] || mask.get_pixel(x, y).0[0] == 0 {
                continue;
            }
            let mut area = 0u32;
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);
            let mut stack = vec![(x, y)];
            visited[idx(x, y)] = true;
            while let Some((cx, cy)) = stack.pop() {
                area += 1;
                min_x = min_x.min(cx);
                min_y = min_y.min(cy);
                max_x = max_x.max(cx);
                max_y = max_y.max(cy);
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = cx as i32 + dx;
                        let ny = cy as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                            continue;
                        }
                        let (nx, ny) = (nx as u32, ny as u32);
                        if !visited[idx(nx, ny)] && mask.get_pixel(nx, ny).0[0] > 0 {
                            visited[idx(nx, ny)] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }
            blobs.push(Blob {
                area,
                bbox: BoundingBox::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1),
            });
        }
    }
    blobs
}
