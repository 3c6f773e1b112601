//! Data models for groupsync.
//!
//! Member identities as seen by callers ([`ExternalKey`]) and by providers
//! ([`InternalKey`]).

mod member;

pub use member::{ExternalKey, InternalKey};
pub(crate) use member::join_keys;
