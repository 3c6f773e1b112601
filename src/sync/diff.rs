//! Member set difference.

use super::OperatingMode;
use crate::models::ExternalKey;
use serde::Serialize;
use std::collections::HashSet;

/// Additions and removals that converge a target onto a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemberDiff {
    /// Keys in the source but not in the target.
    pub to_add: Vec<ExternalKey>,
    /// Keys in the target but not in the source.
    pub to_remove: Vec<ExternalKey>,
}

impl MemberDiff {
    /// Computes `source − target` and `target − source`.
    ///
    /// Keys compare exactly. Duplicates collapse and each side keeps the
    /// first-occurrence order of its input.
    #[must_use]
    pub fn compute(source: &[ExternalKey], target: &[ExternalKey]) -> Self {
        Self {
            to_add: difference(source, target),
            to_remove: difference(target, source),
        }
    }

    /// Drops the half of the diff the mode excludes.
    #[must_use]
    pub fn restrict(mut self, mode: OperatingMode) -> Self {
        match mode {
            OperatingMode::AddAndRemove => {},
            OperatingMode::AddOnly => self.to_remove.clear(),
            OperatingMode::RemoveOnly => self.to_add.clear(),
        }
        self
    }

    /// Total number of additions and removals.
    #[must_use]
    pub fn changes(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }

    /// Returns `true` if the sides already agree.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

fn difference(left: &[ExternalKey], right: &[ExternalKey]) -> Vec<ExternalKey> {
    let exclude: HashSet<&ExternalKey> = right.iter().collect();
    let mut seen = HashSet::new();
    left.iter()
        .filter(|key| !exclude.contains(key) && seen.insert(*key))
        .cloned()
        .collect()
}
