//! ABOUTME: End-to-end pipeline test: canned frames in, one motion event out
//! ABOUTME: Exercises corruption skip, tracking, aggregation, and the artifact worker

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use sw_capture::MockFrameSource;
use sw_pipeline::{
    AggregatorConfig, AlertArtifact, AlertArtifactBuilder, AlertSink, ArtifactJob,
    DetectionRecord, DetectionStore, MotionEvent, MotionEventAggregator, PipelineRunner,
    RunnerConfig,
};
use sw_vision::comparator::{ComparatorConfig, FrameComparator};
use sw_vision::tracker::{TrackerConfig, TurtleTracker};
use sw_vision::utils::{frame_at, frame_with_square, solid_frame};
use sw_vision::CropConfig;
use tokio::sync::{mpsc, watch};

struct RecordingBuilder;

#[async_trait]
impl AlertArtifactBuilder for RecordingBuilder {
    async fn build(&self, _event: &MotionEvent) -> sw_core::Result<AlertArtifact> {
        Ok(AlertArtifact {
            animation: "/tmp/event.gif".into(),
            video: None,
            photo: None,
            crops: Vec::new(),
        })
    }
}

#[derive(Clone)]
struct RecordingStore(Arc<Mutex<Vec<DetectionRecord>>>);

#[async_trait]
impl DetectionStore for RecordingStore {
    async fn record_detection(&self, record: &DetectionRecord) -> bool {
        self.0.lock().unwrap().push(record.clone());
        true
    }
}

#[derive(Clone)]
struct RecordingSink(Arc<Mutex<Vec<MotionEvent>>>);

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send_alert(&self, event: &MotionEvent, _: Option<&AlertArtifact>) -> bool {
        self.0.lock().unwrap().push(event.clone());
        true
    }
}

/// A terrarium session: stillness, one corrupted capture, the subject
/// walking right for six frames, then stillness again.
fn session_frames() -> Vec<sw_vision::Frame> {
    // 96px tall keeps stddev and mean realistic for flat synthetic frames
    let square = |x: u32| frame_with_square(320, 96, x, 20, 50, 200);
    let mut frames = Vec::new();
    frames.push(frame_at(square(40), 0));
    frames.push(frame_at(square(40), 1));
    frames.push(frame_at(square(40), 2));
    // All-black frame: the corruption filter must skip it without
    // disturbing the reference frame
    frames.push(frame_at(solid_frame(320, 96, 0), 3));
    for (i, x) in [50u32, 60, 70, 80, 90, 100].iter().enumerate() {
        frames.push(frame_at(square(*x), 4 + i as i64));
    }
    frames.push(frame_at(square(100), 10));
    frames.push(frame_at(square(100), 11));
    frames.push(frame_at(square(100), 12));
    frames
}

#[tokio::test]
async fn test_session_produces_single_event() {
    let source = Arc::new(MockFrameSource::new(session_frames()));

    let tracker = TurtleTracker::new(
        FrameComparator::new(ComparatorConfig::default()),
        TrackerConfig::default(),
    );
    let aggregator = MotionEventAggregator::new(AggregatorConfig {
        inactivity_timeout_secs: 2.0,
        max_frames: 16,
    });

    let (job_tx, job_rx) = mpsc::channel::<ArtifactJob>(4);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let recorded = Arc::new(Mutex::new(Vec::new()));
    let alerted = Arc::new(Mutex::new(Vec::new()));
    let worker = sw_pipeline::spawn_artifact_worker(
        job_rx,
        Arc::new(RecordingBuilder),
        Arc::new(RecordingStore(recorded.clone())),
        Arc::new(RecordingSink(alerted.clone())),
    );

    let runner = PipelineRunner::new(
        source,
        tracker,
        aggregator,
        CropConfig::default(),
        RunnerConfig {
            capture_interval_ms: 1,
            idle_interval_ms: 1,
            max_consecutive_failures: 1,
        },
        job_tx,
        shutdown_rx,
    );

    // The runner ends with an error once the canned frames run out
    let result = runner.run().await;
    assert!(result.is_err());
    worker.await.unwrap();

    // Alert delivery saw exactly one event
    let events = alerted.lock().unwrap();
    assert_eq!(events.len(), 1, "exactly one event expected");
    let event = &events[0];

    // Six frame pairs showed movement
    assert_eq!(event.frames.len(), 6);
    assert_eq!(event.evicted_frames, 0);
    assert_eq!(event.started_at, frame_at(solid_frame(1, 1, 0), 4).captured_at());
    assert_eq!(event.ended_at, frame_at(solid_frame(1, 1, 0), 9).captured_at());

    // The tracked box drifts right with the subject and never regresses
    let mut last_x = 0;
    for frame in &event.frames {
        assert!(frame.bbox.fits_within(320, 96));
        assert!(frame.bbox.x >= last_x, "bbox must not move backwards");
        assert!(frame.confidence > 0.0);
        assert!(frame.change_percent > 1.0);
        assert!(frame.crop.width() >= 64);
        last_x = frame.bbox.x;
    }

    // One persisted record per motion frame, all tied to the same event
    let records = recorded.lock().unwrap();
    assert_eq!(records.len(), 6);
    for (record, frame) in records.iter().zip(&event.frames) {
        assert_eq!(record.event_id, event.id);
        assert_eq!(record.detected_at, frame.captured_at);
        assert_eq!(record.bbox, frame.bbox);
        assert!(record.crop_path.is_none());
    }
}

#[tokio::test]
async fn test_shutdown_flushes_open_event() {
    // Motion right up to the end of the feed: the event never times out,
    // so the final flush on runner exit must emit it
    let square = |x: u32| frame_with_square(320, 96, x, 20, 50, 200);
    let mut frames = vec![frame_at(square(40), 0)];
    for (i, x) in [50u32, 60, 70].iter().enumerate() {
        frames.push(frame_at(square(*x), 1 + i as i64));
    }
    let source = Arc::new(MockFrameSource::new(frames));

    let tracker = TurtleTracker::new(
        FrameComparator::new(ComparatorConfig::default()),
        TrackerConfig::default(),
    );
    let aggregator = MotionEventAggregator::new(AggregatorConfig::default());

    let (job_tx, job_rx) = mpsc::channel::<ArtifactJob>(4);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let recorded = Arc::new(Mutex::new(Vec::new()));
    let alerted = Arc::new(Mutex::new(Vec::new()));
    let worker = sw_pipeline::spawn_artifact_worker(
        job_rx,
        Arc::new(RecordingBuilder),
        Arc::new(RecordingStore(recorded.clone())),
        Arc::new(RecordingSink(alerted.clone())),
    );

    let runner = PipelineRunner::new(
        source,
        tracker,
        aggregator,
        CropConfig::default(),
        RunnerConfig {
            capture_interval_ms: 1,
            idle_interval_ms: 1,
            max_consecutive_failures: 1,
        },
        job_tx,
        shutdown_rx,
    );

    let _ = runner.run().await;
    worker.await.unwrap();

    let events = alerted.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].frames.len(), 3);
    // Three frames, three persisted records
    assert_eq!(recorded.lock().unwrap().len(), 3);
}
