//! ABOUTME: Hybrid subject tracker combining frame differencing with template matching
//! ABOUTME: Holds a confidence-scored lock on the subject and smooths its bounding box

use crate::comparator::FrameComparator;
use crate::{BoundingBox, Frame};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Configuration for the subject tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Minimum normalized cross-correlation score to accept a template match
    pub match_threshold: f64,
    /// Share of the new observation when smoothing the lock bounding box
    pub smoothing_weight: f64,
    /// Confidence multiplier applied on each template-match failure
    pub confidence_decay: f64,
    /// Confidence added on each successful template match, capped at 1.0
    pub confidence_gain: f64,
    /// Lock is dropped once confidence falls below this
    pub confidence_floor: f64,
    /// Context margin around the lock box when cutting the template, in
    /// comparison-resolution pixels
    pub template_margin: u32,
    /// Search window margin around the template, in comparison-resolution pixels
    pub search_margin: u32,
    /// Templates smaller than this on either side are not matched
    pub min_template_size: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.6,
            smoothing_weight: 0.7,
            confidence_decay: 0.8,
            confidence_gain: 0.1,
            confidence_floor: 0.3,
            template_margin: 8,
            search_margin: 24,
            min_template_size: 8,
        }
    }
}

/// How the reported bounding box was obtained this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackMethod {
    /// No motion this cycle
    None,
    /// Fresh frame-difference observation
    Comparator,
    /// Template match refined against the held lock
    Template,
}

/// Per-cycle tracking result
#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub motion_detected: bool,
    /// Subject bounding box in full-resolution coordinates
    pub bbox: Option<BoundingBox>,
    /// Lock confidence after this cycle, 0.0 when unlocked
    pub confidence: f64,
    /// Changed-pixel percentage from the comparator
    pub change_percent: f64,
    pub method: TrackMethod,
}

/// Held position and trust in it
#[derive(Debug, Clone)]
struct TrackLock {
    bbox: BoundingBox,
    confidence: f64,
}

/// Tracks a single slow-moving subject across frames.
///
/// The comparator decides every cycle whether anything moved at all; the
/// template matcher only refines WHERE, by re-finding the locked region of
/// the previous frame in the current one. Match failures decay confidence
/// and fall back to the comparator's fresh observation; enough consecutive
/// failures drop the lock entirely.
pub struct TurtleTracker {
    comparator: FrameComparator,
    config: TrackerConfig,
    lock: Option<TrackLock>,
}

impl TurtleTracker {
    pub fn new(comparator: FrameComparator, config: TrackerConfig) -> Self {
        Self {
            comparator,
            config,
            lock: None,
        }
    }

    pub fn has_lock(&self) -> bool {
        self.lock.is_some()
    }

    /// Current lock confidence, 0.0 when unlocked
    pub fn confidence(&self) -> f64 {
        self.lock.as_ref().map_or(0.0, |l| l.confidence)
    }

    /// Drop any held lock, e.g. after a capture gap
    pub fn reset(&mut self) {
        self.lock = None;
    }

    /// Process one frame pair and report motion plus the best subject box
    pub fn track(&mut self, current: &Frame, previous: &Frame) -> TrackOutcome {
        let cur_small = self.comparator.prepare(current);
        let prev_small = self.comparator.prepare(previous);
        let outcome =
            self.comparator
                .compare_prepared(&cur_small, &prev_small, current.width(), current.height());

        let change_percent = outcome.change_percent;
        if !outcome.motion_detected {
            return TrackOutcome {
                motion_detected: false,
                bbox: None,
                confidence: self.confidence(),
                change_percent,
                method: TrackMethod::None,
            };
        }

        // motion_detected implies the comparator produced a box
        let observed = match outcome.bbox {
            Some(b) => b,
            None => {
                return TrackOutcome {
                    motion_detected: false,
                    bbox: None,
                    confidence: self.confidence(),
                    change_percent,
                    method: TrackMethod::None,
                }
            }
        };

        let lock = match self.lock.take() {
            None => {
                debug!(?observed, "Lock acquired from frame difference");
                self.lock = Some(TrackLock {
                    bbox: observed,
                    confidence: 1.0,
                });
                return TrackOutcome {
                    motion_detected: true,
                    bbox: Some(observed),
                    confidence: 1.0,
                    change_percent,
                    method: TrackMethod::Comparator,
                };
            }
            Some(lock) => lock,
        };

        match self.match_against_lock(&cur_small, &prev_small, &lock, current) {
            Some(matched) => {
                let smoothed = lock
                    .bbox
                    .smooth_toward(&matched, self.config.smoothing_weight)
                    .clamp_to(current.width(), current.height());
                let confidence = (lock.confidence + self.config.confidence_gain).min(1.0);
                trace!(?smoothed, confidence, "Template match held the lock");
                self.lock = Some(TrackLock {
                    bbox: smoothed,
                    confidence,
                });
                TrackOutcome {
                    motion_detected: true,
                    bbox: Some(smoothed),
                    confidence,
                    change_percent,
                    method: TrackMethod::Template,
                }
            }
            None => {
                let confidence = lock.confidence * self.config.confidence_decay;
                if confidence < self.config.confidence_floor {
                    debug!(confidence, "Confidence fell through the floor, lock dropped");
                    self.lock = None;
                } else {
                    debug!(confidence, ?observed, "Template match failed, lock moved to fresh observation");
                    self.lock = Some(TrackLock {
                        bbox: observed,
                        confidence,
                    });
                }
                TrackOutcome {
                    motion_detected: true,
                    bbox: Some(observed),
                    confidence,
                    change_percent,
                    method: TrackMethod::Comparator,
                }
            }
        }
    }

    /// Re-find the locked region of the previous frame in the current frame.
    /// Returns the matched box in full-resolution coordinates, or None when
    /// the template is degenerate or nothing scores above the threshold.
    fn match_against_lock(
        &self,
        cur_small: &GrayImage,
        prev_small: &GrayImage,
        lock: &TrackLock,
        current: &Frame,
    ) -> Option<BoundingBox> {
        let (sw, sh) = cur_small.dimensions();
        let down_x = sw as f64 / current.width() as f64;
        let down_y = sh as f64 / current.height() as f64;

        let lock_small = lock.bbox.scale(down_x, down_y).clamp_to(sw, sh);
        let template_region = lock_small
            .expand(self.config.template_margin, self.config.template_margin, sw, sh);
        if template_region.width < self.config.min_template_size
            || template_region.height < self.config.min_template_size
        {
            trace!(?template_region, "Template too small to match");
            return None;
        }

        let search = template_region.expand(self.config.search_margin, self.config.search_margin, sw, sh);
        let best = match_template(cur_small, prev_small, &template_region, &search)?;
        if best.score < self.config.match_threshold {
            trace!(score = best.score, "Best template score below threshold");
            return None;
        }

        // Carry the lock box at its held size, shifted to the matched origin
        let offset_x = lock_small.x - template_region.x;
        let offset_y = lock_small.y - template_region.y;
        let matched_small = BoundingBox::new(
            best.x + offset_x,
            best.y + offset_y,
            lock_small.width,
            lock_small.height,
        );
        let matched = matched_small
            .scale(1.0 / down_x, 1.0 / down_y)
            .clamp_to(current.width(), current.height());
        Some(matched)
    }
}

struct Match {
    x: u32,
    y: u32,
    score: f64,
}

/// Normalized cross-correlation of `template_region` (cut from `template_src`)
/// against every placement inside `search` in `image`. A zero-variance
/// template cannot be matched and yields None; zero-variance image patches
/// score 0.
fn match_template(
    image: &GrayImage,
    template_src: &GrayImage,
    template_region: &BoundingBox,
    search: &BoundingBox,
) -> Option<Match> {
    let tw = template_region.width;
    let th = template_region.height;
    if tw > search.width || th > search.height {
        return None;
    }

    let n = (tw as u64 * th as u64) as f64;
    let mut t_sum = 0.0f64;
    let mut t_sum_sq = 0.0f64;
    for ty in 0..th {
        for tx in 0..tw {
            let v = template_src
                .get_pixel(template_region.x + tx, template_region.y + ty)
                .0[0] as f64;
            t_sum += v;
            t_sum_sq += v * v;
        }
    }
    let t_mean = t_sum / n;
    let t_var = (t_sum_sq / n - t_mean * t_mean).max(0.0);
    if t_var < f64::EPSILON {
        return None;
    }

    let mut best: Option<Match> = None;
    for oy in search.y..=(search.bottom() - th) {
        for ox in search.x..=(search.right() - tw) {
            let mut i_sum = 0.0f64;
            let mut i_sum_sq = 0.0f64;
            let mut cross = 0.0f64;
            for ty in 0..th {
                for tx in 0..tw {
                    let iv = image.get_pixel(ox + tx, oy + ty).0[0] as f64;
                    let tv = template_src
                        .get_pixel(template_region.x + tx, template_region.y + ty)
                        .0[0] as f64;
                    i_sum += iv;
                    i_sum_sq += iv * iv;
                    cross += iv * tv;
                }
            }
            let i_mean = i_sum / n;
            let i_var = (i_sum_sq / n - i_mean * i_mean).max(0.0);
            let score = if i_var < f64::EPSILON {
                0.0
            } else {
                (cross / n - i_mean * t_mean) / (i_var.sqrt() * t_var.sqrt())
            };
            let better = best.as_ref().map_or(true, |b| score > b.score);
            if better {
                best = Some(Match {
                    x: ox,
                    y: oy,
                    score,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::ComparatorConfig;
    use crate::utils::*;

    fn tracker() -> TurtleTracker {
        TurtleTracker::new(
            FrameComparator::new(ComparatorConfig::default()),
            TrackerConfig::default(),
        )
    }

    #[test]
    fn test_still_frames_report_no_motion() {
        let mut t = tracker();
        let frame = frame_at(frame_with_square(320, 240, 40, 80, 50, 200), 0);
        let outcome = t.track(&frame, &frame);
        assert!(!outcome.motion_detected);
        assert_eq!(outcome.method, TrackMethod::None);
        assert!(!t.has_lock());
    }

    #[test]
    fn test_lock_acquired_on_first_motion() {
        let mut t = tracker();
        let frames = moving_square_sequence(320, 240, 2, 40, 80, 50, 10);
        let prev = frame_at(frames[0].clone(), 0);
        let cur = frame_at(frames[1].clone(), 1);
        let outcome = t.track(&cur, &prev);
        assert!(outcome.motion_detected);
        assert_eq!(outcome.method, TrackMethod::Comparator);
        assert_eq!(outcome.confidence, 1.0);
        assert!(t.has_lock());
        assert!(outcome.bbox.is_some());
    }

    #[test]
    fn test_template_tracking_follows_movement() {
        let mut t = tracker();
        let frames = moving_square_sequence(320, 240, 5, 40, 80, 50, 10);
        let mut last_x = 0u32;
        for i in 1..frames.len() {
            let prev = frame_at(frames[i - 1].clone(), (i - 1) as i64);
            let cur = frame_at(frames[i].clone(), i as i64);
            let outcome = t.track(&cur, &prev);
            assert!(outcome.motion_detected, "frame {i} should show motion");
            let bbox = outcome.bbox.expect("motion implies a bbox");
            assert!(bbox.fits_within(320, 240));
            if i == 1 {
                assert_eq!(outcome.method, TrackMethod::Comparator);
            } else {
                assert_eq!(outcome.method, TrackMethod::Template, "frame {i}");
                assert!(bbox.x > last_x, "box should drift right at frame {i}");
            }
            last_x = bbox.x;
        }
        assert!(t.has_lock());
        assert_eq!(t.confidence(), 1.0);
    }

    #[test]
    fn test_confidence_decays_and_lock_drops() {
        // A square teleporting between two far positions: every cycle shows
        // motion, but the locked region of the previous frame is blank
        // background (or the search area is), so template matching fails
        let mut t = tracker();
        let at = |x: u32| frame_with_square(320, 240, x, 80, 50, 200);
        let positions = [10u32, 200, 10, 200, 10, 200, 10, 200];
        let frames: Vec<_> = positions
            .iter()
            .enumerate()
            .map(|(i, &x)| frame_at(at(x), i as i64))
            .collect();

        let first = t.track(&frames[1], &frames[0]);
        assert_eq!(first.method, TrackMethod::Comparator);
        assert_eq!(first.confidence, 1.0);

        let mut last = 1.0f64;
        for i in 2..8 {
            let outcome = t.track(&frames[i], &frames[i - 1]);
            assert!(outcome.motion_detected);
            assert_eq!(outcome.method, TrackMethod::Comparator, "frame {i}");
            assert!(outcome.confidence < last, "confidence must decay at frame {i}");
            last = outcome.confidence;
        }
        // 1.0 * 0.8^6 = 0.262, under the 0.3 floor
        assert!(last < 0.3);
        assert!(!t.has_lock());
    }

    #[test]
    fn test_lock_reacquired_after_drop() {
        let mut t = tracker();
        let at = |x: u32| frame_with_square(320, 240, x, 80, 50, 200);
        let mut frames: Vec<_> = [10u32, 200, 10, 200, 10, 200, 10, 200]
            .iter()
            .enumerate()
            .map(|(i, &x)| frame_at(at(x), i as i64))
            .collect();
        for i in 1..8 {
            t.track(&frames[i], &frames[i - 1]);
        }
        assert!(!t.has_lock());

        // Smooth motion again: first cycle reacquires at full confidence
        frames.push(frame_at(at(210), 8));
        let outcome = t.track(&frames[8], &frames[7]);
        assert!(outcome.motion_detected);
        assert_eq!(outcome.method, TrackMethod::Comparator);
        assert_eq!(outcome.confidence, 1.0);
        assert!(t.has_lock());
    }

    #[test]
    fn test_reset_clears_lock() {
        let mut t = tracker();
        let frames = moving_square_sequence(320, 240, 2, 40, 80, 50, 10);
        t.track(
            &frame_at(frames[1].clone(), 1),
            &frame_at(frames[0].clone(), 0),
        );
        assert!(t.has_lock());
        t.reset();
        assert!(!t.has_lock());
        assert_eq!(t.confidence(), 0.0);
    }
}
