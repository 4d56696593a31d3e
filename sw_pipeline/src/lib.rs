//! ABOUTME: Motion event aggregation and the capture pipeline runner
//! ABOUTME: Wires capture, vision, and the artifact worker behind collaborator traits

pub mod aggregator;
pub mod event;
pub mod runner;
pub mod sinks;
pub mod worker;

pub use aggregator::{AggregatorConfig, MotionEventAggregator};
pub use event::{MotionEvent, MotionFrame};
pub use runner::{PipelineRunner, RunnerConfig};
pub use sinks::{AlertArtifact, AlertArtifactBuilder, AlertSink, DetectionRecord, DetectionStore};
pub use worker::{spawn_artifact_worker, ArtifactJob};
