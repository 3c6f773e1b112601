//! Logging initialisation.
//!
//! The library only emits `tracing` events and `metrics` samples. This module
//! installs a subscriber for binaries; it is never called from library code.

mod logging;

pub use logging::{LOG_ENV, LOG_FILE_ENV, LOG_FORMAT_ENV, LogFormat, LoggingConfig};

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Initialises logging from the environment.
///
/// # Errors
///
/// Returns an error if logging was already initialised or the log file
/// cannot be opened.
pub fn init_from_env(verbose: bool) -> Result<()> {
    init(LoggingConfig::from_env(verbose))
}

/// Installs the global `tracing` subscriber.
///
/// # Errors
///
/// Returns an error if logging was already initialised or the log file
/// cannot be opened.
pub fn init(config: LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Err(already_initialised());
    }

    match (&config.file, config.format) {
        (Some(log_file), LogFormat::Json) => {
            let writer = SharedLogFile::open(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true),
                )
                .with(config.filter)
                .try_init()
                .map_err(|e| logging_failure("logging_init", e))?;
        },
        (Some(log_file), LogFormat::Pretty) => {
            let writer = SharedLogFile::open(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true),
                )
                .with(config.filter)
                .try_init()
                .map_err(|e| logging_failure("logging_init", e))?;
        },
        (None, LogFormat::Json) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true),
                )
                .with(config.filter)
                .try_init()
                .map_err(|e| logging_failure("logging_init", e))?;
        },
        (None, LogFormat::Pretty) => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_target(true))
                .with(config.filter)
                .try_init()
                .map_err(|e| logging_failure("logging_init", e))?;
        },
    }

    LOGGING_INIT.set(()).map_err(|()| already_initialised())
}

fn already_initialised() -> Error {
    logging_failure("logging_init", "logging already initialized")
}

fn logging_failure(operation: &str, cause: impl ToString) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: cause.to_string(),
    }
}

/// Append-only log file shared by every event the fmt layer writes.
#[derive(Clone)]
struct SharedLogFile(Arc<Mutex<File>>);

impl SharedLogFile {
    /// Opens `path` for appending. Missing parent directories are created.
    fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| logging_failure("create_log_dir", e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| logging_failure("open_log_file", format!("{}: {e}", path.display())))?;
        Ok(Self(Arc::new(Mutex::new(file))))
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, File>> {
        self.0.lock().map_err(|e| io::Error::other(e.to_string()))
    }
}

impl Write for SharedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogFile {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("groupsync.log");

        SharedLogFile::open(&path).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("groupsync.log");

        let mut first = SharedLogFile::open(&path).unwrap();
        first.write_all(b"first\n").unwrap();
        first.flush().unwrap();
        let mut second = SharedLogFile::open(&path).unwrap();
        second.write_all(b"second\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_open_fails_on_directory() {
        let dir = tempfile::tempdir().unwrap();

        let err = SharedLogFile::open(dir.path()).err();

        assert!(matches!(err, Some(Error::OperationFailed { operation, .. }) if operation == "open_log_file"));
    }
}
