//! ABOUTME: Collaborator traits the pipeline hands finished events to
//! ABOUTME: Persistence, alert delivery, and artifact building live behind these seams

use crate::event::MotionEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use sw_core::{Id, Result};
use sw_vision::BoundingBox;

/// Files produced for one motion event
#[derive(Debug, Clone)]
pub struct AlertArtifact {
    /// Animated GIF of the event's crops
    pub animation: PathBuf,
    /// MP4 rendition, when video encoding is available
    pub video: Option<PathBuf>,
    /// Representative still crop
    pub photo: Option<PathBuf>,
    /// Stored per-frame crops, aligned with the event's frames.
    /// Empty when crop storage failed.
    pub crops: Vec<PathBuf>,
}

/// One motion frame ready for persistence
#[derive(Debug, Clone)]
pub struct DetectionRecord {
    /// The event this frame belongs to
    pub event_id: Id,
    pub detected_at: DateTime<Utc>,
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub change_percent: f64,
    /// Stored crop for this frame, when crop storage succeeded
    pub crop_path: Option<PathBuf>,
}

/// Builds alert artifacts (GIF, MP4, photo) from a finished event
#[async_trait]
pub trait AlertArtifactBuilder: Send + Sync {
    async fn build(&self, event: &MotionEvent) -> Result<AlertArtifact>;
}

/// Persists detections, one record per motion frame. Returns whether the
/// write succeeded; persistence failures must not stop alert delivery.
#[async_trait]
pub trait DetectionStore: Send + Sync {
    async fn record_detection(&self, record: &DetectionRecord) -> bool;
}

/// Delivers alerts for finished events. The artifact is `None` when the
/// build failed; the event is still announced, just without media. Returns
/// whether delivery succeeded; delivery failures must not stop persistence.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, event: &MotionEvent, artifact: Option<&AlertArtifact>) -> bool;
}
