//! # Groupsync
//!
//! Differential membership sync between group directories.
//!
//! Groupsync keeps the member list of one group (a Slack user group, a
//! Terraform Cloud organisation, ...) in line with another. Every directory is
//! reached through an [`Adapter`] exposing `get`, `add` and `remove` over
//! external keys (usually email addresses); the [`SyncEngine`] diffs two member
//! sets and applies the additions and removals to the target.
//!
//! ## Features
//!
//! - Uniform adapter contract with per-adapter identifier caches
//! - Pagination and batch lookups hidden behind `get`
//! - Cancellation and deadlines observed by every backend call
//! - Dry runs, add-only / remove-only modes and change limits
//!
//! ## Example
//!
//! ```rust,ignore
//! use groupsync::adapters::{AdapterConfig, slack::SlackUserGroup};
//! use groupsync::{SyncContext, SyncEngine, SyncOptions};
//!
//! let mut target = SlackUserGroup::init(&AdapterConfig::from_pairs([
//!     ("slack_api_key", "xoxb-..."),
//!     ("slack_user_group_id", "S0123"),
//! ]))?;
//!
//! let ctx = SyncContext::new();
//! let report = SyncEngine::new(SyncOptions::default())
//!     .sync(&ctx, &["alice@example.com".into()], &mut target)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod adapters;
pub mod config;
pub mod context;
pub mod models;
pub mod observability;
pub mod sync;

// Re-exports for convenience
pub use adapters::{Adapter, AdapterConfig, AdapterKind, BackendError};
pub use context::{CancelHandle, CancelReason, SyncContext};
pub use models::{ExternalKey, InternalKey};
pub use sync::{MemberDiff, OperatingMode, OperationOrder, SyncEngine, SyncOptions, SyncReport};

/// Error type for groupsync operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `MissingConfig` | A required adapter setting is absent at construction |
/// | `InvalidConfig` | Sync definition file is malformed or references unset variables |
/// | `CacheEmpty` | `add`/`remove` called before a successful `get` |
/// | `Backend` | The provider API rejected or failed a call |
/// | `Cancelled` | The run context was cancelled or its deadline passed |
/// | `ReadOnly` | Mutating a source-only adapter |
/// | `TooManyChanges` | A sync diff exceeds the configured change limit |
/// | `OperationFailed` | Local I/O or initialisation failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A required configuration key was absent.
    ///
    /// Not retryable without supplying the key.
    #[error("{adapter}: missing required config key '{key}'")]
    MissingConfig {
        /// Adapter kind being constructed.
        adapter: &'static str,
        /// The missing key.
        key: String,
    },

    /// Configuration could not be understood.
    ///
    /// Raised when:
    /// - The sync definition file is not valid TOML
    /// - An adapter kind is unknown
    /// - A `${VAR}` reference names an unset environment variable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `add` or `remove` was called before any successful `get`.
    #[error("{adapter}: identifier cache is empty, call get first")]
    CacheEmpty {
        /// Adapter kind that rejected the call.
        adapter: &'static str,
    },

    /// The backend service failed.
    ///
    /// `source` keeps the provider's own signal so callers can match on it.
    #[error("{adapter}: {operation} failed for '{subject}': {source}")]
    Backend {
        /// Adapter kind that issued the call.
        adapter: &'static str,
        /// Backend operation, e.g. `usergroups.users.update`.
        operation: &'static str,
        /// Group or key the call was about.
        subject: String,
        /// The backend failure.
        #[source]
        source: BackendError,
    },

    /// The run was cancelled or ran out of time.
    ///
    /// Always surfaced, never suppressed.
    #[error("operation cancelled: {reason}")]
    Cancelled {
        /// Why the context stopped.
        reason: CancelReason,
    },

    /// The adapter only supports `get`.
    #[error("{adapter}: {operation} is not supported, adapter is read-only")]
    ReadOnly {
        /// Adapter kind.
        adapter: &'static str,
        /// Rejected operation.
        operation: &'static str,
    },

    /// A sync would apply more changes than allowed.
    #[error("sync would apply {changes} changes, limit is {limit}")]
    TooManyChanges {
        /// Number of additions plus removals.
        changes: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// A local operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns `true` if this is a cancellation or deadline error.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns the backend failure, if this error wraps one.
    #[must_use]
    pub const fn backend_source(&self) -> Option<&BackendError> {
        match self {
            Self::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for groupsync operations.
pub type Result<T> = std::result::Result<T, Error>;
