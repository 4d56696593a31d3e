//! ABOUTME: Background worker that turns finished events into artifacts and alerts
//! ABOUTME: Drains a bounded job queue so encoding never blocks the capture loop

use crate::event::MotionEvent;
use crate::sinks::{AlertArtifactBuilder, AlertSink, DetectionRecord, DetectionStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Work item for the artifact worker
#[derive(Debug)]
pub struct ArtifactJob {
    pub event: MotionEvent,
}

/// Spawn the artifact worker. It processes jobs until the sender side is
/// dropped, then drains whatever is queued and exits, so shutdown never
/// loses an already-flushed event.
pub fn spawn_artifact_worker(
    mut jobs: mpsc::Receiver<ArtifactJob>,
    builder: Arc<dyn AlertArtifactBuilder>,
    store: Arc<dyn DetectionStore>,
    sink: Arc<dyn AlertSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            process_job(job, &*builder, &*store, &*sink).await;
        }
        info!("Artifact worker finished, queue drained");
    })
}

async fn process_job(
    job: ArtifactJob,
    builder: &dyn AlertArtifactBuilder,
    store: &dyn DetectionStore,
    sink: &dyn AlertSink,
) {
    let event = job.event;
    let event_id = event.id.clone();
    info!(event_id = %event_id, frames = event.frames.len(), "Building alert artifacts");

    // A failed build downgrades the event, it never discards it: the
    // detections are still persisted and the alert goes out without media
    let artifact = match builder.build(&event).await {
        Ok(artifact) => Some(artifact),
        Err(e) => {
            error!(event_id = %event_id, error = %e, "Artifact build failed, alert degraded");
            None
        }
    };

    // Persistence and delivery are independent; one failing must not
    // suppress the other. One record per motion frame.
    let crops = artifact.as_ref().map(|a| a.crops.as_slice()).unwrap_or(&[]);
    let mut recorded = true;
    for (i, frame) in event.frames.iter().enumerate() {
        let record = DetectionRecord {
            event_id: event_id.clone(),
            detected_at: frame.captured_at,
            bbox: frame.bbox,
            confidence: frame.confidence,
            change_percent: frame.change_percent,
            crop_path: crops.get(i).cloned(),
        };
        recorded &= store.record_detection(&record).await;
    }
    if !recorded {
        warn!(event_id = %event_id, "Some detections were not persisted");
    }
    let delivered = sink.send_alert(&event, artifact.as_ref()).await;
    if !delivered {
        warn!(event_id = %event_id, "Alert was not delivered");
    }

    info!(event_id = %event_id, recorded, delivered, "Event processed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MotionFrame;
    use crate::sinks::{AlertArtifact, DetectionRecord};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sw_core::{Error, Id, Result};
    use sw_vision::utils::solid_frame;
    use sw_vision::BoundingBox;

    fn test_event() -> MotionEvent {
        let now = Utc::now();
        MotionEvent {
            id: Id::new(),
            started_at: now,
            ended_at: now,
            frames: vec![MotionFrame {
                crop: solid_frame(32, 32, 100),
                bbox: BoundingBox::new(0, 0, 32, 32),
                confidence: 1.0,
                change_percent: 2.0,
                captured_at: now,
            }],
            evicted_frames: 0,
            peak_change_percent: 2.0,
        }
    }

    struct StubBuilder {
        fail_first: AtomicUsize,
        built: AtomicUsize,
    }

    #[async_trait]
    impl AlertArtifactBuilder for StubBuilder {
        async fn build(&self, _event: &MotionEvent) -> Result<AlertArtifact> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Artifact("encode failed".to_string()));
            }
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(AlertArtifact {
                animation: "/tmp/event.gif".into(),
                video: None,
                photo: None,
                crops: vec!["/tmp/crop.jpg".into()],
            })
        }
    }

    #[derive(Default)]
    struct CountingStore {
        records: AtomicUsize,
        with_crop: AtomicUsize,
    }

    #[async_trait]
    impl DetectionStore for CountingStore {
        async fn record_detection(&self, record: &DetectionRecord) -> bool {
            self.records.fetch_add(1, Ordering::SeqCst);
            if record.crop_path.is_some() {
                self.with_crop.fetch_add(1, Ordering::SeqCst);
            }
            true
        }
    }

    #[derive(Default)]
    struct CountingSink {
        alerts: AtomicUsize,
        without_media: AtomicUsize,
    }

    #[async_trait]
    impl AlertSink for CountingSink {
        async fn send_alert(&self, _: &MotionEvent, artifact: Option<&AlertArtifact>) -> bool {
            self.alerts.fetch_add(1, Ordering::SeqCst);
            if artifact.is_none() {
                self.without_media.fetch_add(1, Ordering::SeqCst);
            }
            true
        }
    }

    #[tokio::test]
    async fn test_worker_processes_jobs_then_drains() {
        let builder = Arc::new(StubBuilder {
            fail_first: AtomicUsize::new(0),
            built: AtomicUsize::new(0),
        });
        let store = Arc::new(CountingStore::default());
        let sink = Arc::new(CountingSink::default());

        let (tx, rx) = mpsc::channel(4);
        let handle =
            spawn_artifact_worker(rx, builder.clone(), store.clone(), sink.clone());

        tx.send(ArtifactJob { event: test_event() }).await.unwrap();
        tx.send(ArtifactJob { event: test_event() }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(builder.built.load(Ordering::SeqCst), 2);
        assert_eq!(store.records.load(Ordering::SeqCst), 2);
        assert_eq!(store.with_crop.load(Ordering::SeqCst), 2);
        assert_eq!(sink.alerts.load(Ordering::SeqCst), 2);
        assert_eq!(sink.without_media.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_build_failure_still_persists_and_alerts() {
        let builder = Arc::new(StubBuilder {
            fail_first: AtomicUsize::new(1),
            built: AtomicUsize::new(0),
        });
        let store = Arc::new(CountingStore::default());
        let sink = Arc::new(CountingSink::default());

        let (tx, rx) = mpsc::channel(4);
        let handle =
            spawn_artifact_worker(rx, builder.clone(), store.clone(), sink.clone());

        tx.send(ArtifactJob { event: test_event() }).await.unwrap();
        tx.send(ArtifactJob { event: test_event() }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        // First job failed to build: its detection is persisted without a
        // crop path and its alert goes out without media
        assert_eq!(builder.built.load(Ordering::SeqCst), 1);
        assert_eq!(store.records.load(Ordering::SeqCst), 2);
        assert_eq!(store.with_crop.load(Ordering::SeqCst), 1);
        assert_eq!(sink.alerts.load(Ordering::SeqCst), 2);
        assert_eq!(sink.without_media.load(Ordering::SeqCst), 1);
    }
}
