//! Run context: correlation id, cancellation and deadline.
//!
//! A [`SyncContext`] is passed by reference to every adapter operation and on
//! to every backend call those operations issue. Adapters call
//! [`SyncContext::check`] before each backend request, including each page of
//! a paginated fetch, so a cancelled run stops at the next request boundary
//! instead of returning partial results.

use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Why a context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`CancelHandle::cancel`] was called.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Per-run context with correlation id, cancellation flag and optional deadline.
///
/// Cheap to clone; clones share the cancellation flag.
#[derive(Clone, Debug)]
pub struct SyncContext {
    run_id: String,
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncContext {
    /// Creates a new context with a generated run id and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::from_id(Uuid::new_v4().to_string())
    }

    /// Creates a new context with an existing run id.
    #[must_use]
    pub fn from_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Sets a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets an absolute deadline. An earlier existing deadline is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns a handle that cancels this context (and all its clones).
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Returns why the context stopped, or `None` while it is live.
    #[must_use]
    pub fn done(&self) -> Option<CancelReason> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fails with [`Error::Cancelled`] once the context is done.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if the context was cancelled or its deadline passed.
    pub fn check(&self) -> Result<()> {
        match self.done() {
            Some(reason) => Err(Error::Cancelled { reason }),
            None => Ok(()),
        }
    }

    /// Time left before the deadline; `None` without a deadline.
    ///
    /// Saturates at zero once the deadline has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// Cancels a [`SyncContext`] from another thread (e.g. a Ctrl-C handler).
#[derive(Clone, Debug)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Cancels the context. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
