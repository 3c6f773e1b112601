//! Global subscriber installation.
//!
//! Lives in its own test binary: installing the subscriber is process-wide.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use groupsync::Error;
use groupsync::observability::{self, LogFormat, LoggingConfig};

#[test]
fn test_init_once_then_rejects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("groupsync.log");

    observability::init(LoggingConfig::from_parts(
        Some("info"),
        LogFormat::Json,
        Some(path.clone()),
        false,
    ))
    .unwrap();
    tracing::info!(run_id = "run-1", "Sync started");

    let second = observability::init(LoggingConfig::from_parts(None, LogFormat::Pretty, None, false));

    assert!(matches!(
        second,
        Err(Error::OperationFailed { ref operation, .. }) if operation == "logging_init"
    ));
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("Sync started"));
    assert!(contents.contains("run-1"));
}
