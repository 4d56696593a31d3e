//! ABOUTME: Groups consecutive motion frames into events bounded by inactivity
//! ABOUTME: Keeps a FIFO-capped frame buffer and flushes each event exactly once

use crate::event::{MotionEvent, MotionFrame};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use sw_core::Id;
use tracing::{debug, info};

/// Configuration for event aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Seconds of stillness after the last motion frame before the event ends
    pub inactivity_timeout_secs: f64,
    /// Maximum motion frames retained per event; older frames are evicted
    pub max_frames: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 8.0,
            max_frames: 16,
        }
    }
}

/// In-progress event state
struct ActiveEvent {
    id: Id,
    started_at: DateTime<Utc>,
    last_motion_at: DateTime<Utc>,
    frames: VecDeque<MotionFrame>,
    evicted: usize,
    peak_change_percent: f64,
}

/// Turns per-frame motion observations into discrete events.
///
/// Timing is driven by frame timestamps rather than the wall clock, so the
/// aggregator behaves identically on live captures and replayed sequences.
/// Flushing removes the event from internal state before handing it out;
/// an event can never be emitted twice.
pub struct MotionEventAggregator {
    config: AggregatorConfig,
    active: Option<ActiveEvent>,
}

impl MotionEventAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Number of frames currently buffered for the active event
    pub fn buffered_frames(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.frames.len())
    }

    /// Record a frame that showed motion. Starts an event if none is active.
    pub fn observe_motion(&mut self, frame: MotionFrame) {
        let captured_at = frame.captured_at;
        let change = frame.change_percent;

        let active = self.active.get_or_insert_with(|| {
            let id = Id::new();
            info!(event_id = %id, at = %captured_at, "Motion event started");
            ActiveEvent {
                id,
                started_at: captured_at,
                last_motion_at: captured_at,
                frames: VecDeque::new(),
                evicted: 0,
                peak_change_percent: 0.0,
            }
        });

        active.last_motion_at = captured_at;
        if change > active.peak_change_percent {
            active.peak_change_percent = change;
        }
        active.frames.push_back(frame);
        while active.frames.len() > self.config.max_frames {
            active.frames.pop_front();
            active.evicted += 1;
        }
        debug!(
            event_id = %active.id,
            buffered = active.frames.len(),
            evicted = active.evicted,
            "Motion frame buffered"
        );
    }

    /// Record a still frame. Returns the finished event once the inactivity
    /// timeout has elapsed since the last motion frame.
    pub fn observe_still(&mut self, at: DateTime<Utc>) -> Option<MotionEvent> {
        let timed_out = self.active.as_ref().is_some_and(|active| {
            let still_for = (at - active.last_motion_at).num_milliseconds() as f64 / 1000.0;
            still_for >= self.config.inactivity_timeout_secs
        });
        if timed_out {
            self.flush()
        } else {
            None
        }
    }

    /// Flush any in-progress event immediately, e.g. on shutdown
    pub fn stop(&mut self) -> Option<MotionEvent> {
        self.flush()
    }

    fn flush(&mut self) -> Option<MotionEvent> {
        let active = self.active.take()?;
        let event = MotionEvent {
            id: active.id,
            started_at: active.started_at,
            ended_at: active.last_motion_at,
            frames: active.frames.into(),
            evicted_frames: active.evicted,
            peak_change_percent: active.peak_change_percent,
        };
        info!(
            event_id = %event.id,
            frames = event.frames.len(),
            evicted = event.evicted_frames,
            duration_secs = event.duration().num_seconds(),
            "Motion event finished"
        );
        Some(event)
    }
}
