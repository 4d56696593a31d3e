//! ABOUTME: Frame acquisition for the terrarium camera
//! ABOUTME: Trait-based capture abstraction with still-command and mock implementations

use async_trait::async_trait;
use sw_core::Result;
use sw_vision::Frame;

pub mod mock_source;
pub mod still_command;

pub use mock_source::MockFrameSource;
pub use still_command::{StillCommandConfig, StillCommandSource};

/// Trait for frame sources (camera command, canned frames in tests)
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Capture one full-resolution frame
    async fn capture(&self) -> Result<Frame>;

    /// Check that the source can produce frames at all. Called once at
    /// startup; a failure here is fatal rather than retried.
    async fn validate(&self) -> Result<()>;

    /// Human-readable source name for logs and frame metadata
    fn name(&self) -> &str;
}
