//! ABOUTME: Alert artifact generation from finished motion events
//! ABOUTME: GIF and MP4 encoding, representative photos, and crop storage

pub mod builder;
pub mod store;

pub use builder::{ArtifactBuilder, ArtifactConfig, VideoConfig};
pub use store::{CropStore, EventSummary, FrameRecord, StoredCrops};
