//! Source tree node classification: ignore set, group levels and placement.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Absolute paths excluded from traversal entirely.
///
/// A directory in the set is pruned before descent, so nothing below it is
/// ever visited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreSet(BTreeSet<PathBuf>);

impl IgnoreSet {
    /// Create an empty ignore set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an absolute path to the set.
    pub fn insert(&mut self, path: impl Into<PathBuf>) {
        self.0.insert(path.into());
    }

    /// Check if exactly this path is ignored.
    pub fn contains(&self, path: &Path) -> bool {
        self.0.contains(path)
    }

    /// Check if this path or any of its ancestors is ignored.
    pub fn covers(&self, path: &Path) -> bool {
        path.ancestors().any(|p| self.contains(p))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for IgnoreSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Depth budgets for grouped directories, keyed by root-relative path.
///
/// Every stored budget is positive: a budget that would reach zero is
/// dropped instead, which turns the directories below it back into leaves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLevels(BTreeMap<PathBuf, u32>);

impl GroupLevels {
    /// Create an empty map (everything is a leaf).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the budget for a directory. A zero budget removes the entry.
    pub fn insert(&mut self, dir: impl Into<PathBuf>, budget: u32) {
        let dir = dir.into();
        if budget == 0 {
            self.0.remove(&dir);
        } else {
            self.0.insert(dir, budget);
        }
    }

    /// Remaining budget for exactly this key.
    pub fn budget(&self, dir: &Path) -> Option<u32> {
        self.0.get(dir).copied()
    }

    /// Check if `relative` is equal to or below any grouped directory.
    pub fn matches(&self, relative: &Path) -> bool {
        self.0.keys().any(|key| relative.starts_with(key))
    }

    /// Levels that apply inside `relative` once it has been descended into.
    ///
    /// Only keys `relative` is equal to or below survive, each decremented
    /// by one, and those reaching zero are dropped.
    pub fn descend(&self, relative: &Path) -> GroupLevels {
        GroupLevels(
            self.0
                .iter()
                .filter(|(key, budget)| relative.starts_with(key) && **budget > 1)
                .map(|(key, budget)| (key.clone(), budget - 1))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, u32)> {
        self.0.iter().map(|(k, v)| (k.as_path(), *v))
    }
}

impl<P: Into<PathBuf>> FromIterator<(P, u32)> for GroupLevels {
    fn from_iter<I: IntoIterator<Item = (P, u32)>>(iter: I) -> Self {
        let mut levels = GroupLevels::new();
        for (dir, budget) in iter {
            levels.insert(dir, budget);
        }
        levels
    }
}

/// What the partitioner does with one child of the directory it explores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// Not a directory: packed with its siblings into one shared blob.
    Loose,
    /// Directory with remaining budget: explored child by child.
    Grouped,
    /// Directory archived whole into a single blob.
    Leaf,
}

impl Placement {
    /// Decide the placement of a child given its root-relative path.
    pub fn of(is_dir: bool, relative: &Path, levels: &GroupLevels) -> Self {
        if !is_dir {
            Self::Loose
        } else if levels.matches(relative) {
            Self::Grouped
        } else {
            Self::Leaf
        }
    }
}
