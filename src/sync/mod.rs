//! Differential sync.
//!
//! The [`SyncEngine`] fetches both sides, diffs them with [`MemberDiff`] and
//! applies the additions and removals to the target adapter. It never
//! retries and never rolls back: a failed step is reported as-is, and a later
//! run recomputes the diff from fresh state.

mod diff;
mod engine;

pub use diff::MemberDiff;
pub use engine::{OperatingMode, OperationOrder, SyncEngine, SyncOptions, SyncReport};
