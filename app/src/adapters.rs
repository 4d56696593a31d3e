//! ABOUTME: Pipeline collaborator adapters: SQLite persistence and Telegram delivery
//! ABOUTME: Both report success as bool so one failing never suppresses the other

use async_trait::async_trait;
use sw_db::{Db, DetectionRepository, NewDetection};
use sw_notify::Notifier;
use sw_pipeline::{AlertArtifact, AlertSink, DetectionRecord, DetectionStore, MotionEvent};
use tracing::{error, info, warn};

/// Persists motion frames as detection rows, one row per frame
pub struct SqliteDetectionStore {
    db: Db,
}

impl SqliteDetectionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    fn to_new_detection(record: &DetectionRecord) -> NewDetection {
        NewDetection {
            id: None,
            event_id: record.event_id.to_string(),
            detected_at: record
                .detected_at
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            bbox_x: record.bbox.x as i64,
            bbox_y: record.bbox.y as i64,
            bbox_w: record.bbox.width as i64,
            bbox_h: record.bbox.height as i64,
            confidence: record.confidence,
            change_percent: record.change_percent,
            img_path: record.crop_path.as_ref().map(|p| p.display().to_string()),
        }
    }
}

#[async_trait]
impl DetectionStore for SqliteDetectionStore {
    async fn record_detection(&self, record: &DetectionRecord) -> bool {
        let request = Self::to_new_detection(record);
        match DetectionRepository::new(self.db.pool()).insert(request).await {
            Ok(detection) => {
                info!(detection_id = %detection.id, "Detection recorded");
                true
            }
            Err(e) => {
                error!(event_id = %record.event_id, error = %e, "Failed to record detection");
                false
            }
        }
    }
}

/// Delivers finished events over Telegram. The animation is the alert;
/// the MP4 rendition is sent afterwards when one was produced.
pub struct TelegramAlertSink {
    notifier: Box<dyn Notifier>,
}

impl TelegramAlertSink {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self { notifier }
    }

    fn caption(event: &MotionEvent) -> String {
        format!(
            "Turtle activity: {} frames over {}s (peak change {:.1}%)",
            event.observed_frames(),
            event.duration().num_seconds(),
            event.peak_change_percent
        )
    }
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    async fn send_alert(&self, event: &MotionEvent, artifact: Option<&AlertArtifact>) -> bool {
        let caption = Self::caption(event);

        // No artifact: the event is still announced as plain text
        let artifact = match artifact {
            Some(artifact) => artifact,
            None => {
                return match self.notifier.send_message(&caption).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(event_id = %event.id, error = %e, "Text alert delivery failed");
                        false
                    }
                };
            }
        };

        let delivered = match self
            .notifier
            .send_animation(&caption, &artifact.animation)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Animation delivery failed");
                // A still is better than silence
                match artifact.photo.as_ref() {
                    Some(photo) => self
                        .notifier
                        .send_photo(&caption, photo)
                        .await
                        .map_err(|e| {
                            error!(event_id = %event.id, error = %e, "Photo fallback failed")
                        })
                        .is_ok(),
                    None => false,
                }
            }
        };

        if let Some(video) = artifact.video.as_ref() {
            if let Err(e) = self.notifier.send_video(&caption, video).await {
                warn!(event_id = %event.id, error = %e, "Video delivery failed");
            }
        }

        delivered
    }
}

/// Stand-in sink for when no Telegram credentials are configured
pub struct LogOnlyAlertSink;

#[async_trait]
impl AlertSink for LogOnlyAlertSink {
    async fn send_alert(&self, event: &MotionEvent, artifact: Option<&AlertArtifact>) -> bool {
        match artifact {
            Some(artifact) => info!(
                event_id = %event.id,
                animation = %artifact.animation.display(),
                "Alert ready (no delivery channel configured)"
            ),
            None => info!(
                event_id = %event.id,
                "Alert ready without media (no delivery channel configured)"
            ),
        }
        true
    }
}
