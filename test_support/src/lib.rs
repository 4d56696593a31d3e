//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Common test fixtures and temp-dir helpers for all crates

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Create a unique test id for isolating filesystem fixtures
pub fn create_test_id() -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-id-{}-{}", std::process::id(), n)
}

/// Helper for creating temporary directories in tests
pub fn temp_dir_path() -> std::path::PathBuf {
    std::env::temp_dir().join("shellwatch-test")
}
