//! Branching time for replayable simulations
//!
//! Provides the coordinates every versioned read and write is addressed by:
//! - `Tick` - Discrete time step within a branch
//! - `BranchId` - Name of one line of history
//! - `TimeCoordinate` - A (branch, tick) pair
//! - `BranchTree` - Forest of branches, each remembering where it forked

use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A discrete tick identifier (logical time unit)
pub type Tick = u64;

/// Identifier of a branch of history
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(pub String);

impl BranchId {
    /// Name of the root branch when nothing else is configured
    pub const TRUNK: &'static str = "trunk";

    /// Create a new branch ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The default root branch
    pub fn trunk() -> Self {
        Self::new(Self::TRUNK)
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BranchId {
    fn default() -> Self {
        Self::trunk()
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BranchId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BranchId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A point in the tree of histories
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeCoordinate {
    pub branch: BranchId,
    pub tick: Tick,
}

impl TimeCoordinate {
    /// Create a new coordinate
    pub fn new(branch: impl Into<BranchId>, tick: Tick) -> Self {
        Self {
            branch: branch.into(),
            tick,
        }
    }

    /// A coordinate on the default trunk branch
    pub fn trunk(tick: Tick) -> Self {
        Self::new(BranchId::trunk(), tick)
    }

    /// The same branch at another tick
    pub fn with_tick(&self, tick: Tick) -> Self {
        Self {
            branch: self.branch.clone(),
            tick,
        }
    }

    /// Move to the next tick
    pub fn advance(&mut self) -> Tick {
        self.tick += 1;
        self.tick
    }
}

impl Default for TimeCoordinate {
    fn default() -> Self {
        Self::trunk(0)
    }
}

impl fmt::Display for TimeCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.branch, self.tick)
    }
}

/// Where a non-root branch split off from its parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchOrigin {
    /// The branch this one was forked from
    pub parent: BranchId,
    /// Parent tick at which the fork happened
    pub tick: Tick,
}

/// Ancestry of every known branch
///
/// Forking records ancestry only; no data is copied. Readers see pre-fork
/// history through the parent chain, which keeps branch creation O(1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchTree {
    /// Root branch of the tree
    trunk: BranchId,
    /// Every branch, in creation order, with its origin (`None` for roots)
    origins: IndexMap<BranchId, Option<BranchOrigin>>,
}

impl BranchTree {
    /// Create a tree holding a single root branch
    pub fn new(trunk: impl Into<BranchId>) -> Self {
        let trunk = trunk.into();
        let mut origins = IndexMap::new();
        origins.insert(trunk.clone(), None);
        Self { trunk, origins }
    }

    /// The root branch this tree was created with
    pub fn trunk(&self) -> &BranchId {
        &self.trunk
    }

    /// Check whether a branch is registered
    pub fn contains(&self, branch: &BranchId) -> bool {
        self.origins.contains_key(branch)
    }

    /// Origin of a branch; `Ok(None)` for a root
    pub fn origin(&self, branch: &BranchId) -> Result<Option<&BranchOrigin>> {
        self.origins
            .get(branch)
            .map(Option::as_ref)
            .ok_or_else(|| Error::UnknownBranch(branch.clone()))
    }

    /// Parent of a branch, if it has one
    pub fn parent(&self, branch: &BranchId) -> Option<&BranchId> {
        self.origins
            .get(branch)
            .and_then(Option::as_ref)
            .map(|origin| &origin.parent)
    }

    /// Fork `parent` at `tick` under a generated name
    ///
    /// Generated names are `"{parent}.{n}"` with the smallest free `n`.
    pub fn fork(&mut self, parent: &BranchId, tick: Tick) -> Result<BranchId> {
        let mut n = self.children(parent).count() + 1;
        let mut name = BranchId::new(format!("{}.{}", parent, n));
        while self.contains(&name) {
            n += 1;
            name = BranchId::new(format!("{}.{}", parent, n));
        }
        self.fork_named(name, parent, tick)
    }

    /// Fork `parent` at `tick` under an explicit name
    pub fn fork_named(
        &mut self,
        name: impl Into<BranchId>,
        parent: &BranchId,
        tick: Tick,
    ) -> Result<BranchId> {
        let name = name.into();
        if !self.contains(parent) {
            return Err(Error::UnknownBranch(parent.clone()));
        }
        if self.contains(&name) {
            return Err(Error::BranchConflict(name));
        }
        tracing::debug!(branch = %name, parent = %parent, tick, "forked branch");
        self.origins.insert(
            name.clone(),
            Some(BranchOrigin {
                parent: parent.clone(),
                tick,
            }),
        );
        Ok(name)
    }

    /// Register a branch with a known origin, as when reloading saved ancestry
    pub fn restore(&mut self, branch: BranchId, origin: Option<BranchOrigin>) {
        self.origins.insert(branch, origin);
    }

    /// Walk from `at` up through every ancestor
    ///
    /// Yields `at` first, then `(parent, fork_tick)` for each ancestor.
    pub fn lineage<'a>(&'a self, at: &'a TimeCoordinate) -> Lineage<'a> {
        Lineage {
            tree: self,
            next: Some((&at.branch, at.tick)),
        }
    }

    /// True if `ancestor` is `branch` itself or any branch above it
    pub fn is_ancestor(&self, ancestor: &BranchId, branch: &BranchId) -> bool {
        let mut cursor = Some(branch);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Direct children of a branch
    pub fn children<'a>(&'a self, branch: &'a BranchId) -> impl Iterator<Item = &'a BranchId> {
        self.origins.iter().filter_map(move |(id, origin)| match origin {
            Some(origin) if &origin.parent == branch => Some(id),
            _ => None,
        })
    }

    /// All branches in creation order, with their origins
    pub fn iter(&self) -> impl Iterator<Item = (&BranchId, Option<&BranchOrigin>)> {
        self.origins
            .iter()
            .map(|(id, origin)| (id, origin.as_ref()))
    }

    /// Number of branches
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// A tree always holds its trunk, so this is false in practice
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

impl Default for BranchTree {
    fn default() -> Self {
        Self::new(BranchId::trunk())
    }
}

/// Iterator over a coordinate and its ancestors' fork points
pub struct Lineage<'a> {
    tree: &'a BranchTree,
    next: Option<(&'a BranchId, Tick)>,
}

impl<'a> Iterator for Lineage<'a> {
    type Item = (&'a BranchId, Tick);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = self
            .tree
            .origins
            .get(current.0)
            .and_then(Option::as_ref)
            .map(|origin| (&origin.parent, origin.tick));
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate() {
        let mut at = TimeCoordinate::trunk(3);
        assert_eq!(at.to_string(), "trunk@3");
        assert_eq!(at.advance(), 4);
        assert_eq!(at.with_tick(9), TimeCoordinate::new("trunk", 9));
    }

    #[test]
    fn test_fork_generates_names() {
        let mut tree = BranchTree::default();
        let trunk = BranchId::trunk();

        let a = tree.fork(&trunk, 10).unwrap();
        let b = tree.fork(&trunk, 12).unwrap();
        assert_eq!(a.as_str(), "trunk.1");
        assert_eq!(b.as_str(), "trunk.2");
        assert_eq!(tree.parent(&a), Some(&trunk));
        assert_eq!(tree.origin(&b).unwrap().map(|o| o.tick), Some(12));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_fork_errors() {
        let mut tree = BranchTree::default();
        let missing = BranchId::new("nowhere");
        assert_eq!(
            tree.fork(&missing, 1),
            Err(Error::UnknownBranch(missing.clone()))
        );

        tree.fork_named("alt", &BranchId::trunk(), 1).unwrap();
        let err = tree.fork_named("alt", &BranchId::trunk(), 2).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_lineage() {
        let mut tree = BranchTree::default();
        let child = tree.fork_named("child", &BranchId::trunk(), 10).unwrap();
        let grandchild = tree.fork_named("grandchild", &child, 15).unwrap();

        let at = TimeCoordinate::new(grandchild.clone(), 20);
        let walk: Vec<_> = tree
            .lineage(&at)
            .map(|(b, t)| (b.as_str().to_string(), t))
            .collect();
        assert_eq!(
            walk,
            vec![
                ("grandchild".to_string(), 20),
                ("child".to_string(), 15),
                ("trunk".to_string(), 10),
            ]
        );

        assert!(tree.is_ancestor(&BranchId::trunk(), &grandchild));
        assert!(!tree.is_ancestor(&grandchild, &child));
    }

    #[test]
    fn test_tree_serde() {
        let mut tree = BranchTree::default();
        tree.fork_named("alt", &BranchId::trunk(), 4).unwrap();

        let text = ron::to_string(&tree).expect("serialize");
        let back: BranchTree = ron::from_str(&text).expect("deserialize");
        assert_eq!(back, tree);
    }
}
