//! ABOUTME: Degenerate-frame rejection before frames reach tracking state
//! ABOUTME: Flags uniform, extreme-brightness, and stripe-corrupted captures

use image::GrayImage;
use tracing::debug;

/// Frames darker than this mean intensity are considered corrupted
const MIN_MEAN: f64 = 5.0;
/// Frames brighter than this mean intensity are considered corrupted
const MAX_MEAN: f64 = 250.0;
/// Frames with less intensity spread than this are considered corrupted
const MIN_STDDEV: f64 = 1.0;
/// Frames with more intensity spread than this are considered corrupted
const MAX_STDDEV: f64 = 100.0;
/// Minimum distinct intensities expected in a sampled row
const MIN_ROW_DISTINCT: usize = 10;
/// Row sampling only applies to frames taller than this
const ROW_CHECK_MIN_HEIGHT: u32 = 100;

/// Rejects garbage captures (sensor glitches, driver stripe corruption)
/// before they can poison the comparator's reference frame or the tracker's
/// template. Pure inspection; false positives just cost one skipped cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct CorruptionFilter;

impl CorruptionFilter {
    pub fn new() -> Self {
        Self
    }

    /// Check whether a frame looks corrupted
    pub fn is_corrupted(&self, gray: &GrayImage) -> bool {
        if gray.width() == 0 || gray.height() == 0 {
            return true;
        }

        let (mean, stddev) = intensity_stats(gray);

        if mean < MIN_MEAN || mean > MAX_MEAN {
            debug!(mean, "Frame rejected: extreme mean intensity");
            return true;
        }
        if stddev < MIN_STDDEV || stddev > MAX_STDDEV {
            debug!(stddev, "Frame rejected: degenerate intensity spread");
            return true;
        }

        // Stripe corruption shows up as rows with only a handful of values
        if gray.height() > ROW_CHECK_MIN_HEIGHT {
            let row = gray.height() / 2;
            let mut seen = [false; 256];
            let mut distinct = 0usize;
            for x in 0..gray.width() {
                let v = gray.get_pixel(x, row).0[0] as usize;
                if !seen[v] {
                    seen[v] = true;
                    distinct += 1;
                }
            }
            if distinct < MIN_ROW_DISTINCT {
                debug!(distinct, row, "Frame rejected: stripe pattern in sampled row");
                return true;
            }
        }

        false
    }
}

/// Mean and standard deviation of pixel intensities
fn intensity_stats(gray: &GrayImage) -> (f64, f64) {
    let n = (gray.width() as u64 * gray.height() as u64) as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for p in gray.pixels() {
        let v = p.0[0] as f64;
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    (mean, variance.sqrt())
}
