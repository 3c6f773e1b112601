//! Identifier cache.
//!
//! Maps external keys to the provider's internal keys. The cache has two
//! states: it starts [`IdentifierCache::Uninitialized`] and only a successful
//! `get` moves it to [`IdentifierCache::Populated`]. Mutations look up their
//! internal keys through [`IdentifierCache::entries`], which fails with
//! [`Error::CacheEmpty`] in the uninitialised state.
//!
//! Several provider accounts may share one external key (two Slack users with
//! the same email, two memberships for one address). The key is reported once
//! but every internal key stays cached, so full-replace updates keep all of
//! them and removals drop all of them.

use super::AdapterKind;
use crate::models::{ExternalKey, InternalKey};
use crate::{Error, Result};
use std::collections::HashMap;

/// External → internal keys mapping owned by one adapter instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IdentifierCache {
    /// No `get` has succeeded yet.
    #[default]
    Uninitialized,
    /// Mapping from the most recent `get`, updated by later mutations.
    Populated(HashMap<ExternalKey, Vec<InternalKey>>),
}

impl IdentifierCache {
    /// Replaces the whole cache with freshly fetched pairs.
    ///
    /// Pairs sharing an external key are grouped. Entries from earlier
    /// fetches never survive a replace.
    pub fn replace(&mut self, pairs: impl IntoIterator<Item = (ExternalKey, InternalKey)>) {
        let mut entries: HashMap<ExternalKey, Vec<InternalKey>> = HashMap::new();
        for (key, id) in pairs {
            push_unique(entries.entry(key).or_default(), id);
        }
        *self = Self::Populated(entries);
    }

    /// Returns `true` once a `get` has populated the cache.
    #[must_use]
    pub const fn is_populated(&self) -> bool {
        matches!(self, Self::Populated(_))
    }

    /// Returns the mapping, or `CacheEmpty` for the given adapter kind.
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheEmpty` if the cache has never been populated.
    pub fn entries(&self, kind: AdapterKind) -> Result<&HashMap<ExternalKey, Vec<InternalKey>>> {
        match self {
            Self::Populated(entries) => Ok(entries),
            Self::Uninitialized => Err(Error::CacheEmpty {
                adapter: kind.as_str(),
            }),
        }
    }

    /// Looks up the internal keys for an external key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[InternalKey]> {
        match self {
            Self::Populated(entries) => entries.get(key).map(Vec::as_slice),
            Self::Uninitialized => None,
        }
    }

    /// Returns `true` if the external key is cached.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of cached external keys.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Populated(entries) => entries.len(),
            Self::Uninitialized => 0,
        }
    }

    /// Returns `true` if no members are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds mappings after a successful add.
    ///
    /// Does nothing while uninitialised: a partial mapping must not pass for
    /// a fetched one.
    pub fn upsert(&mut self, mappings: impl IntoIterator<Item = (ExternalKey, InternalKey)>) {
        if let Self::Populated(entries) = self {
            for (key, id) in mappings {
                push_unique(entries.entry(key).or_default(), id);
            }
        }
    }

    /// Drops every mapping of the given keys after a successful remove.
    pub fn evict<'a>(&mut self, keys: impl IntoIterator<Item = &'a ExternalKey>) {
        if let Self::Populated(entries) = self {
            for key in keys {
                entries.remove(key);
            }
        }
    }
}

fn push_unique(ids: &mut Vec<InternalKey>, id: InternalKey) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated(pairs: &[(&str, &str)]) -> IdentifierCache {
        let mut cache = IdentifierCache::default();
        cache.replace(
            pairs
                .iter()
                .map(|(e, i)| (ExternalKey::from(*e), InternalKey::from(*i))),
        );
        cache
    }

    fn ids(values: &[&str]) -> Vec<InternalKey> {
        values.iter().map(|v| InternalKey::from(*v)).collect()
    }

    #[test]
    fn test_uninitialized_rejects_entries() {
        let cache = IdentifierCache::default();
        assert!(!cache.is_populated());
        assert!(matches!(
            cache.entries(AdapterKind::SlackUserGroup),
            Err(Error::CacheEmpty {
                adapter: "slack_user_group"
            })
        ));
    }

    #[test]
    fn test_populated_with_no_members_is_not_empty_state() {
        let cache = populated(&[]);
        assert!(cache.is_populated());
        assert!(cache.is_empty());
        assert!(cache.entries(AdapterKind::SlackUserGroup).is_ok());
    }

    #[test]
    fn test_replace_discards_stale_entries() {
        let mut cache = populated(&[("foo@email", "foo"), ("bar@email", "bar")]);
        cache.replace([(ExternalKey::from("baz@email"), InternalKey::from("baz"))]);

        assert_eq!(cache.len(), 1);
        assert!(cache.contains("baz@email"));
        assert!(!cache.contains("foo@email"));
    }

    #[test]
    fn test_replace_keeps_every_id_of_a_shared_key() {
        let cache = populated(&[("dup@email", "U1"), ("dup@email", "U2"), ("dup@email", "U1")]);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("dup@email"), Some(ids(&["U1", "U2"]).as_slice()));
    }

    #[test]
    fn test_upsert_and_evict() {
        let mut cache = populated(&[("foo@email", "foo"), ("foo@email", "foo2")]);
        cache.upsert([(ExternalKey::from("fizz@email"), InternalKey::from("fizz"))]);
        assert_eq!(cache.get("fizz@email"), Some(ids(&["fizz"]).as_slice()));

        cache.evict(&[ExternalKey::from("foo@email")]);
        assert!(!cache.contains("foo@email"));
        assert!(cache.contains("fizz@email"));
    }

    #[test]
    fn test_upsert_on_uninitialized_is_noop() {
        let mut cache = IdentifierCache::default();
        cache.upsert([(ExternalKey::from("fizz@email"), InternalKey::from("fizz"))]);
        assert!(!cache.is_populated());
        assert!(!cache.contains("fizz@email"));
    }
}
