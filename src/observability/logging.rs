//! Logging configuration.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Env var holding the log filter directive. Falls back to `RUST_LOG`.
pub const LOG_ENV: &str = "GROUPSYNC_LOG";
/// Env var selecting the output format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "GROUPSYNC_LOG_FORMAT";
/// Env var naming a file to append logs to instead of stdout.
pub const LOG_FILE_ENV: &str = "GROUPSYNC_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines with timestamps.
    #[default]
    Pretty,
    /// One JSON object per event, including the span list.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything but `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Append to this file instead of writing to stdout.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds the configuration from the environment.
    ///
    /// The filter defaults to `info`, or `debug` when `verbose` is set.
    #[must_use]
    pub fn from_env(verbose: bool) -> Self {
        let directive = std::env::var(LOG_ENV)
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok();
        let format = std::env::var(LOG_FORMAT_ENV)
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_default();
        let file = std::env::var_os(LOG_FILE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self::from_parts(directive.as_deref(), format, file, verbose)
    }

    /// Builds the configuration from explicit values.
    ///
    /// An invalid directive falls back to the default level.
    #[must_use]
    pub fn from_parts(
        directive: Option<&str>,
        format: LogFormat,
        file: Option<PathBuf>,
        verbose: bool,
    ) -> Self {
        let default_level = if verbose { "debug" } else { "info" };
        let filter = directive
            .filter(|d| !d.trim().is_empty())
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new(default_level));

        Self {
            format,
            filter,
            file,
        }
    }
}
