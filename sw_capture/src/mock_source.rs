//! ABOUTME: Canned frame source for tests and the end-to-end pipeline harness
//! ABOUTME: Serves a fixed sequence of frames, then reports exhaustion

use crate::FrameSource;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use sw_core::{Error, Result};
use sw_vision::Frame;

/// Frame source that serves a pre-built sequence, in order.
pub struct MockFrameSource {
    frames: Mutex<VecDeque<Frame>>,
    name: String,
}

impl MockFrameSource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: Mutex::new(frames.into_iter().collect()),
            name: "mock-camera".to_string(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn capture(&self) -> Result<Frame> {
        let mut queue = self
            .frames
            .lock()
            .map_err(|_| Error::Capture("Mock frame queue poisoned".to_string()))?;
        queue
            .pop_front()
            .ok_or_else(|| Error::Capture("Mock frame source exhausted".to_string()))
    }

    async fn validate(&self) -> Result<()> {
        if self.remaining() == 0 {
            return Err(Error::Capture("Mock frame source is empty".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
