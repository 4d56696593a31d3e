//! ABOUTME: On-disk crop storage, partitioned by capture date
//! ABOUTME: Every motion frame gets a JPEG plus a JSON sidecar; events get a summary

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use sw_core::{Error, Result};
use sw_pipeline::{MotionEvent, MotionFrame};
use sw_vision::BoundingBox;
use tracing::{debug, instrument};

/// Event metadata written once per stored event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
    /// Frames retained in the event buffer
    pub frames: usize,
    /// Frames evicted from a long event
    pub evicted_frames: usize,
    pub peak_change_percent: f64,
    /// Subject box of the representative frame
    pub bbox: BoundingBox,
    /// Tracker confidence at the representative frame
    pub confidence: f64,
}

impl EventSummary {
    pub fn from_event(event: &MotionEvent) -> Option<Self> {
        let rep = event.representative_frame()?;
        Some(Self {
            id: event.id.to_string(),
            started_at: event.started_at,
            ended_at: event.ended_at,
            duration_secs: event.duration().num_seconds(),
            frames: event.frames.len(),
            evicted_frames: event.evicted_frames,
            peak_change_percent: event.peak_change_percent,
            bbox: rep.bbox,
            confidence: rep.confidence,
        })
    }
}

/// Per-frame metadata written next to each stored crop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub event_id: String,
    pub captured_at: DateTime<Utc>,
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub change_percent: f64,
}

/// Paths of the crops stored for one event
#[derive(Debug, Clone)]
pub struct StoredCrops {
    /// One crop per motion frame, in frame order
    pub frames: Vec<PathBuf>,
    /// The representative frame's crop
    pub photo: PathBuf,
}

/// Writes crops under `<root>/YYYY-MM-DD/`, one JPEG and one JSON sidecar
/// per motion frame, named by capture time to millisecond precision, plus
/// an `<event_id>.json` summary per event.
#[derive(Debug, Clone)]
pub struct CropStore {
    root: PathBuf,
}

impl CropStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn day_dir(&self, at: DateTime<Utc>) -> PathBuf {
        self.root.join(at.format("%Y-%m-%d").to_string())
    }

    fn frame_stem(frame: &MotionFrame) -> String {
        frame.captured_at.format("%H%M%S_%3f").to_string()
    }

    async fn write_jpeg(path: &Path, pixels: &RgbImage) -> Result<()> {
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgb8(pixels.clone())
            .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .map_err(|e| Error::Artifact(format!("Failed to encode crop: {}", e)))?;
        tokio::fs::write(path, &jpeg).await?;
        Ok(())
    }

    /// Store every crop of a finished event plus its summary. Returns the
    /// stored crop paths, with the representative frame's crop as the photo.
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn save_event(&self, event: &MotionEvent) -> Result<StoredCrops> {
        let summary = EventSummary::from_event(event)
            .ok_or_else(|| Error::Artifact("Event has no frames to store".to_string()))?;

        let rep_idx = event
            .frames
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.change_percent.total_cmp(&b.change_percent))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let dir = self.day_dir(event.started_at);
        tokio::fs::create_dir_all(&dir).await?;

        let mut frame_paths = Vec::with_capacity(event.frames.len());
        for frame in &event.frames {
            let stem = Self::frame_stem(frame);
            let crop_path = dir.join(format!("{}.jpg", stem));
            Self::write_jpeg(&crop_path, &frame.crop).await?;

            let record = FrameRecord {
                event_id: event.id.to_string(),
                captured_at: frame.captured_at,
                bbox: frame.bbox,
                confidence: frame.confidence,
                change_percent: frame.change_percent,
            };
            let json = serde_json::to_vec_pretty(&record)
                .map_err(|e| Error::Artifact(format!("Failed to serialize sidecar: {}", e)))?;
            tokio::fs::write(dir.join(format!("{}.json", stem)), &json).await?;
            frame_paths.push(crop_path);
        }

        let json = serde_json::to_vec_pretty(&summary)
            .map_err(|e| Error::Artifact(format!("Failed to serialize summary: {}", e)))?;
        tokio::fs::write(dir.join(format!("{}.json", event.id)), &json).await?;

        let photo = frame_paths[rep_idx].clone();
        debug!(
            frames = frame_paths.len(),
            photo = %photo.display(),
            "Event crops stored"
        );
        Ok(StoredCrops {
            frames: frame_paths,
            photo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sw_core::Id;
    use sw_vision::utils::solid_frame;

    fn test_event() -> MotionEvent {
        let base = chrono::DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let frames = vec![
            MotionFrame {
                crop: solid_frame(48, 32, 90),
                bbox: BoundingBox::new(5, 5, 48, 32),
                confidence: 1.0,
                change_percent: 1.5,
                captured_at: base,
            },
            MotionFrame {
                crop: solid_frame(48, 32, 120),
                bbox: BoundingBox::new(15, 5, 48, 32),
                confidence: 0.9,
                change_percent: 3.5,
                captured_at: base + chrono::Duration::seconds(1),
            },
        ];
        MotionEvent {
            id: Id::new(),
            started_at: base,
            ended_at: base + chrono::Duration::seconds(1),
            frames,
            evicted_frames: 2,
            peak_change_percent: 3.5,
        }
    }

    #[tokio::test]
    async fn test_crops_written_per_frame_in_date_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = CropStore::new(dir.path());
        let event = test_event();

        let stored = store.save_event(&event).await.expect("save should succeed");

        // Representative photo is the strongest-change frame, named by
        // capture time to the millisecond
        assert!(stored.photo.to_string_lossy().contains("2024-06-01"));
        assert!(stored.photo.to_string_lossy().ends_with("120001_000.jpg"));
        let decoded = image::open(&stored.photo).expect("photo should be a valid image");
        assert_eq!(decoded.width(), 48);

        // Crop paths come back in frame order
        assert_eq!(stored.frames.len(), 2);
        assert!(stored.frames[0].to_string_lossy().ends_with("120000_000.jpg"));
        assert_eq!(stored.frames[1], stored.photo);

        // Both frames got a crop and a sidecar
        let day = dir.path().join("2024-06-01");
        assert!(day.join("120000_000.jpg").exists());
        let record: FrameRecord =
            serde_json::from_slice(&std::fs::read(day.join("120000_000.json")).unwrap()).unwrap();
        assert_eq!(record.event_id, event.id.to_string());
        assert_eq!(record.bbox.x, 5);
        assert_eq!(record.change_percent, 1.5);
    }

    #[tokio::test]
    async fn test_event_summary_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = CropStore::new(dir.path());
        let event = test_event();

        store.save_event(&event).await.unwrap();

        let summary_path = dir
            .path()
            .join("2024-06-01")
            .join(format!("{}.json", event.id));
        let summary: EventSummary =
            serde_json::from_slice(&std::fs::read(summary_path).unwrap()).unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.evicted_frames, 2);
        // Summary carries the representative frame's box
        assert_eq!(summary.bbox.x, 15);
        assert_eq!(summary.peak_change_percent, 3.5);
    }

    #[tokio::test]
    async fn test_empty_event_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CropStore::new(dir.path());
        let mut event = test_event();
        event.frames.clear();
        assert!(store.save_event(&event).await.is_err());
    }
}
