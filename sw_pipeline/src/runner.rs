//! ABOUTME: The capture loop: source, corruption filter, tracker, aggregator, job queue
//! ABOUTME: Single task owns all tracking state; finished events go to the artifact worker

use crate::aggregator::MotionEventAggregator;
use crate::event::MotionFrame;
use crate::worker::ArtifactJob;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use sw_capture::FrameSource;
use sw_core::{Error, Result};
use sw_vision::{extract_crop, CorruptionFilter, CropConfig, Frame, TurtleTracker};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

/// Configuration for the capture loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Pacing between captures while an event is active
    pub capture_interval_ms: u64,
    /// Slower pacing while the terrarium is still
    pub idle_interval_ms: u64,
    /// Consecutive capture failures tolerated before the runner gives up
    pub max_consecutive_failures: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            capture_interval_ms: 500,
            idle_interval_ms: 2000,
            max_consecutive_failures: 30,
        }
    }
}

/// Owns the whole per-frame path. All tracking state lives on this one
/// task; the only things leaving it are finished events on the job queue.
pub struct PipelineRunner {
    source: Arc<dyn FrameSource>,
    corruption: CorruptionFilter,
    tracker: TurtleTracker,
    aggregator: MotionEventAggregator,
    crop_config: CropConfig,
    config: RunnerConfig,
    jobs: mpsc::Sender<ArtifactJob>,
    shutdown: watch::Receiver<bool>,
}

impl PipelineRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn FrameSource>,
        tracker: TurtleTracker,
        aggregator: MotionEventAggregator,
        crop_config: CropConfig,
        config: RunnerConfig,
        jobs: mpsc::Sender<ArtifactJob>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            corruption: CorruptionFilter::new(),
            tracker,
            aggregator,
            crop_config,
            config,
            jobs,
            shutdown,
        }
    }

    /// Run the capture loop until shutdown is signalled or the camera fails
    /// persistently. Any in-progress event is flushed before returning.
    #[instrument(skip(self), fields(source = %self.source.name()))]
    pub async fn run(mut self) -> Result<()> {
        self.source.validate().await?;
        info!(
            interval_ms = self.config.capture_interval_ms,
            idle_interval_ms = self.config.idle_interval_ms,
            "Capture loop started"
        );

        let mut previous: Option<Frame> = None;
        let mut failures = 0u32;

        let outcome = loop {
            // Faster pacing only while motion is being buffered
            let pause_ms = if self.aggregator.is_active() {
                self.config.capture_interval_ms
            } else {
                self.config.idle_interval_ms
            };
            let pause = Duration::from_millis(pause_ms.max(1));

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Shutdown signalled, stopping capture loop");
                        break Ok(());
                    }
                }
                _ = tokio::time::sleep(pause) => {
                    match self.source.capture().await {
                        Ok(frame) => {
                            failures = 0;
                            self.process_frame(frame, &mut previous);
                        }
                        Err(e) => {
                            failures += 1;
                            warn!(error = %e, failures, "Capture failed");
                            if failures >= self.config.max_consecutive_failures {
                                break Err(Error::Capture(format!(
                                    "Giving up after {} consecutive capture failures",
                                    failures
                                )));
                            }
                        }
                    }
                }
            }
        };

        // Synchronous flush: whatever was buffering becomes an event before
        // the runner hands control back
        if let Some(event) = self.aggregator.stop() {
            self.enqueue(ArtifactJob { event });
        }
        outcome
    }

    fn process_frame(&mut self, frame: Frame, previous: &mut Option<Frame>) {
        if self.corruption.is_corrupted(&frame.luma()) {
            warn!("Corrupted frame skipped");
            return;
        }

        if let Some(prev) = previous.as_ref() {
            let outcome = self.tracker.track(&frame, prev);
            match outcome.bbox.filter(|_| outcome.motion_detected) {
                Some(bbox) => {
                    let crop = extract_crop(&frame, &bbox, &self.crop_config);
                    self.aggregator.observe_motion(MotionFrame {
                        crop,
                        bbox,
                        confidence: outcome.confidence,
                        change_percent: outcome.change_percent,
                        captured_at: frame.captured_at(),
                    });
                }
                None => {
                    if let Some(event) = self.aggregator.observe_still(frame.captured_at()) {
                        self.enqueue(ArtifactJob { event });
                    }
                }
            }
        } else {
            debug!("Reference frame established");
        }
        *previous = Some(frame);
    }

    fn enqueue(&self, job: ArtifactJob) {
        match self.jobs.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(event_id = %job.event.id, "Artifact queue full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                error!(event_id = %job.event.id, "Artifact queue closed, event dropped");
            }
        }
    }
}
