//! Member identifiers.
//!
//! An [`ExternalKey`] is the stable, caller-facing identity of a member (for
//! every bundled adapter, an email address). It is the unit of comparison
//! across adapters and is compared exactly: no case folding, no trimming.
//!
//! An [`InternalKey`] is whatever a provider needs to mutate membership (a
//! Slack user id, a Terraform Cloud membership id). Internal keys only flow
//! between an adapter and its backend client.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Caller-visible member identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalKey(String);

impl ExternalKey {
    /// Creates a new external key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ExternalKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExternalKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for ExternalKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Provider-specific member identifier.
///
/// Not stable across provider sessions; never returned from an adapter's
/// public operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalKey(String);

impl InternalKey {
    /// Creates a new internal key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InternalKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InternalKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Joins keys into a comma-separated list for log fields and error subjects.
pub(crate) fn join_keys(keys: &[ExternalKey]) -> String {
    keys.iter()
        .map(ExternalKey::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_external_key_is_case_sensitive() {
        let lower = ExternalKey::from("alice@example.com");
        let upper = ExternalKey::from("Alice@example.com");
        assert_ne!(lower, upper);

        let set: HashSet<ExternalKey> = [lower, upper].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_external_key_borrow_lookup() {
        let set: HashSet<ExternalKey> = [ExternalKey::from("a@x")].into_iter().collect();
        assert!(set.contains("a@x"));
        assert!(!set.contains("A@x"));
    }

    #[test]
    fn test_external_key_serde_transparent() {
        let key = ExternalKey::from("a@x");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"a@x\"");
    }

    #[test]
    fn test_join_keys() {
        let keys = vec![ExternalKey::from("a@x"), ExternalKey::from("b@x")];
        assert_eq!(join_keys(&keys), "a@x,b@x");
        assert_eq!(join_keys(&[]), "");
    }
}
