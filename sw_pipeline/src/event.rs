//! ABOUTME: Motion event domain types carried from the capture loop to the artifact worker
//! ABOUTME: A MotionEvent is a bounded buffer of cropped motion frames with metadata

use chrono::{DateTime, Utc};
use image::RgbImage;
use sw_core::Id;
use sw_vision::BoundingBox;

/// One frame's worth of detected motion: the subject crop plus where and
/// how confidently it was found in the full frame.
#[derive(Debug, Clone)]
pub struct MotionFrame {
    /// Subject crop cut from the full-resolution frame
    pub crop: RgbImage,
    /// Subject location in full-resolution coordinates
    pub bbox: BoundingBox,
    /// Tracker confidence when this frame was captured
    pub confidence: f64,
    /// Changed-pixel percentage reported by the comparator
    pub change_percent: f64,
    pub captured_at: DateTime<Utc>,
}

/// A completed motion event: consecutive motion frames bounded by
/// inactivity on both ends.
#[derive(Debug, Clone)]
pub struct MotionEvent {
    pub id: Id,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Motion frames in capture order, oldest first. Bounded; earlier
    /// frames of a long event are evicted.
    pub frames: Vec<MotionFrame>,
    /// Frames dropped from the front of the buffer during the event
    pub evicted_frames: usize,
    /// Highest changed-pixel percentage seen during the event
    pub peak_change_percent: f64,
}

impl MotionEvent {
    /// Total frames observed, including evicted ones
    pub fn observed_frames(&self) -> usize {
        self.frames.len() + self.evicted_frames
    }

    /// Duration from first to last retained motion frame
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }

    /// The frame with the strongest change, used for the alert photo
    pub fn representative_frame(&self) -> Option<&MotionFrame> {
        self.frames.iter().max_by(|a, b| {
            a.change_percent
                .partial_cmp(&b.change_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}
