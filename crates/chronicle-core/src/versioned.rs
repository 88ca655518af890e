//! Branch-aware versioned storage
//!
//! A `VersionedCache` answers "what was the value of this key as of branch B,
//! tick T". Each (key, branch) pair keeps a tick-ordered history; a lookup
//! takes the latest entry at or before the requested tick, and when the
//! branch has nothing that early it continues in the parent branch as of the
//! fork tick.
//!
//! # Example
//!
//! ```
//! use chronicle_core::{BranchId, BranchTree, Lookup, VersionedCache};
//!
//! let mut tree = BranchTree::default();
//! let trunk = BranchId::trunk();
//! let mut cache = VersionedCache::new();
//!
//! cache.set("hunger", &trunk, 5, 10);
//! let child = tree.fork(&trunk, 10).unwrap();
//!
//! assert_eq!(cache.get(&tree, &"hunger", &child, 12), Ok(Lookup::Present(&10)));
//! ```

use crate::{BranchId, BranchOrigin, BranchTree, Error, Result, Tick, TimeCoordinate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

/// One recorded entry in a key's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Slot<V> {
    /// The key holds this value from the entry's tick onward
    Value(V),
    /// The key is absent from the entry's tick onward
    Tombstone,
}

impl<V> Slot<V> {
    /// Borrow the value, if this is not a tombstone
    pub fn as_value(&self) -> Option<&V> {
        match self {
            Slot::Value(v) => Some(v),
            Slot::Tombstone => None,
        }
    }
}

/// Outcome of a successful lookup
///
/// `Deleted` means the history reached an explicit tombstone, which is a
/// different answer from "never recorded" (`Error::NotFound`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<T> {
    Present(T),
    Deleted,
}

impl<T> Lookup<T> {
    /// The value, if present
    pub fn present(self) -> Option<T> {
        match self {
            Lookup::Present(v) => Some(v),
            Lookup::Deleted => None,
        }
    }

    /// Check whether a value was found
    pub fn is_present(&self) -> bool {
        matches!(self, Lookup::Present(_))
    }
}

/// Single step of an ancestor search
enum Probe<'a, 't, V> {
    /// An entry at or before the tick exists on this branch
    Found(&'a Slot<V>),
    /// Nothing here; continue in the parent as of the fork tick
    TryParent(&'t BranchOrigin),
    /// Nothing here and no parent to ask
    Exhausted,
}

type History<V> = BTreeMap<Tick, Slot<V>>;

/// Versioned key/value storage resolved through branch ancestry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize + Eq + Hash, V: Serialize",
    deserialize = "K: Deserialize<'de> + Eq + Hash, V: Deserialize<'de>"
))]
pub struct VersionedCache<K, V> {
    /// key -> branch -> tick -> slot, keys in first-write order
    entries: IndexMap<K, IndexMap<BranchId, History<V>>>,
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for VersionedCache<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K, V> Default for VersionedCache<K, V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<K, V> VersionedCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `key` at exactly (branch, tick)
    ///
    /// Overwrites an existing entry at that tick; other ticks are untouched.
    pub fn set(&mut self, key: K, branch: &BranchId, tick: Tick, value: V) {
        self.write(key, branch, tick, Slot::Value(value));
    }

    /// Record that `key` is absent from (branch, tick) onward
    pub fn delete(&mut self, key: K, branch: &BranchId, tick: Tick) {
        self.write(key, branch, tick, Slot::Tombstone);
    }

    fn write(&mut self, key: K, branch: &BranchId, tick: Tick, slot: Slot<V>) {
        self.entries
            .entry(key)
            .or_default()
            .entry(branch.clone())
            .or_default()
            .insert(tick, slot);
    }

    /// Resolve `key` as of (branch, tick), falling back through ancestors
    pub fn get<'a, 't>(
        &'a self,
        tree: &'t BranchTree,
        key: &K,
        branch: &'t BranchId,
        tick: Tick,
    ) -> Result<Lookup<&'a V>> {
        if !tree.contains(branch) {
            return Err(Error::UnknownBranch(branch.clone()));
        }
        let not_found = || Error::NotFound(format!("{:?} at {}@{}", key, branch, tick));
        let Some(branches) = self.entries.get(key) else {
            return Err(not_found());
        };

        let mut cursor: (&'t BranchId, Tick) = (branch, tick);
        loop {
            match Self::probe(tree, branches, cursor.0, cursor.1) {
                Probe::Found(Slot::Value(v)) => return Ok(Lookup::Present(v)),
                Probe::Found(Slot::Tombstone) => return Ok(Lookup::Deleted),
                Probe::TryParent(origin) => cursor = (&origin.parent, origin.tick),
                Probe::Exhausted => return Err(not_found()),
            }
        }
    }

    /// Resolve `key` at a time coordinate
    pub fn get_at<'a, 't>(
        &'a self,
        tree: &'t BranchTree,
        key: &K,
        at: &'t TimeCoordinate,
    ) -> Result<Lookup<&'a V>> {
        self.get(tree, key, &at.branch, at.tick)
    }

    /// The present value at a coordinate, treating every kind of absence as `None`
    pub fn value_at<'a>(
        &'a self,
        tree: &BranchTree,
        key: &K,
        at: &TimeCoordinate,
    ) -> Option<&'a V> {
        self.get_at(tree, key, at).ok().and_then(Lookup::present)
    }

    /// Check whether `key` has a present value at a coordinate
    pub fn contains_at(&self, tree: &BranchTree, key: &K, at: &TimeCoordinate) -> bool {
        self.value_at(tree, key, at).is_some()
    }

    fn probe<'a, 't>(
        tree: &'t BranchTree,
        branches: &'a IndexMap<BranchId, History<V>>,
        branch: &BranchId,
        tick: Tick,
    ) -> Probe<'a, 't, V> {
        let hit = branches
            .get(branch)
            .and_then(|history| history.range(..=tick).next_back());
        if let Some((_, slot)) = hit {
            return Probe::Found(slot);
        }
        match tree.origin(branch) {
            Ok(Some(origin)) => Probe::TryParent(origin),
            _ => Probe::Exhausted,
        }
    }

    /// Keys with a present value at a coordinate, in first-write order
    pub fn keys_at<'a>(
        &'a self,
        tree: &'a BranchTree,
        at: &'a TimeCoordinate,
    ) -> impl Iterator<Item = &'a K> {
        self.entries
            .keys()
            .filter(move |key| self.contains_at(tree, key, at))
    }

    /// Entries recorded directly on one branch for `key`, oldest first
    ///
    /// `None` marks a tombstone. Ancestor entries are not included.
    pub fn history<'a>(
        &'a self,
        key: &K,
        branch: &BranchId,
    ) -> impl Iterator<Item = (Tick, Option<&'a V>)> {
        self.entries
            .get(key)
            .and_then(|branches| branches.get(branch))
            .into_iter()
            .flat_map(|history| {
                history
                    .iter()
                    .map(|(tick, slot)| (*tick, slot.as_value()))
            })
    }

    /// Every recorded entry as (key, branch, tick, slot)
    pub fn records(&self) -> impl Iterator<Item = (&K, &BranchId, Tick, &Slot<V>)> {
        self.entries.iter().flat_map(|(key, branches)| {
            branches.iter().flat_map(move |(branch, history)| {
                history
                    .iter()
                    .map(move |(tick, slot)| (key, branch, *tick, slot))
            })
        })
    }

    /// Drop everything recorded on `branch`; returns the number of entries removed
    pub fn forget_branch(&mut self, branch: &BranchId) -> usize {
        let mut removed = 0;
        for branches in self.entries.values_mut() {
            if let Some(history) = branches.shift_remove(branch) {
                removed += history.len();
            }
        }
        self.entries.retain(|_, branches| !branches.is_empty());
        removed
    }

    /// Remove every entry for `key` on every branch
    pub fn remove_key(&mut self, key: &K) -> bool {
        self.entries.shift_remove(key).is_some()
    }

    /// All keys ever written, in first-write order
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was ever written
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (BranchTree, BranchId, VersionedCache<&'static str, i64>) {
        (BranchTree::default(), BranchId::trunk(), VersionedCache::new())
    }

    #[test]
    fn test_latest_at_or_before() {
        let (tree, trunk, mut cache) = setup();
        cache.set("gold", &trunk, 2, 10);
        cache.set("gold", &trunk, 6, 20);

        assert_eq!(
            cache.get(&tree, &"gold", &trunk, 2),
            Ok(Lookup::Present(&10))
        );
        assert_eq!(
            cache.get(&tree, &"gold", &trunk, 5),
            Ok(Lookup::Present(&10))
        );
        assert_eq!(
            cache.get(&tree, &"gold", &trunk, 100),
            Ok(Lookup::Present(&20))
        );
        assert!(cache
            .get(&tree, &"gold", &trunk, 1)
            .unwrap_err()
            .is_not_found());
        assert!(cache
            .get(&tree, &"silver", &trunk, 9)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_overwrite_same_tick() {
        let (tree, trunk, mut cache) = setup();
        cache.set("gold", &trunk, 3, 1);
        cache.set("gold", &trunk, 3, 2);

        assert_eq!(
            cache.get(&tree, &"gold", &trunk, 3),
            Ok(Lookup::Present(&2))
        );
        assert_eq!(cache.history(&"gold", &trunk).count(), 1);
    }

    #[test]
    fn test_branch_fallback() {
        let (mut tree, trunk, mut cache) = setup();
        cache.set("key", &trunk, 5, 7);
        let child = tree.fork(&trunk, 10).unwrap();

        assert_eq!(
            cache.get(&tree, &"key", &child, 12),
            Ok(Lookup::Present(&7))
        );
    }

    #[test]
    fn test_fallback_uses_fork_tick() {
        let (mut tree, trunk, mut cache) = setup();
        cache.set("key", &trunk, 5, 7);
        let child = tree.fork(&trunk, 10).unwrap();
        // Written on the parent after the fork: invisible to the child.
        cache.set("key", &trunk, 11, 8);

        assert_eq!(
            cache.get(&tree, &"key", &child, 20),
            Ok(Lookup::Present(&7))
        );
        assert_eq!(
            cache.get(&tree, &"key", &trunk, 20),
            Ok(Lookup::Present(&8))
        );

        // A child write shadows the parent from its tick onward.
        cache.set("key", &child, 15, 9);
        assert_eq!(
            cache.get(&tree, &"key", &child, 14),
            Ok(Lookup::Present(&7))
        );
        assert_eq!(
            cache.get(&tree, &"key", &child, 15),
            Ok(Lookup::Present(&9))
        );
    }

    #[test]
    fn test_grandchild_fallback() {
        let (mut tree, trunk, mut cache) = setup();
        cache.set("key", &trunk, 1, 1);
        let child = tree.fork(&trunk, 5).unwrap();
        let grandchild = tree.fork(&child, 8).unwrap();

        assert_eq!(
            cache.get(&tree, &"key", &grandchild, 9),
            Ok(Lookup::Present(&1))
        );
        assert!(cache.get(&tree, &"key", &trunk, 0).is_err());
    }

    #[test]
    fn test_tombstone_precedence() {
        let (tree, trunk, mut cache) = setup();
        cache.set("key", &trunk, 5, 42);
        cache.delete("key", &trunk, 7);

        assert_eq!(
            cache.get(&tree, &"key", &trunk, 6),
            Ok(Lookup::Present(&42))
        );
        assert_eq!(cache.get(&tree, &"key", &trunk, 8), Ok(Lookup::Deleted));
        assert!(!cache.contains_at(&tree, &"key", &TimeCoordinate::trunk(8)));
    }

    #[test]
    fn test_tombstone_blocks_ancestor() {
        let (mut tree, trunk, mut cache) = setup();
        cache.set("key", &trunk, 1, 3);
        let child = tree.fork(&trunk, 4).unwrap();
        cache.delete("key", &child, 6);

        assert_eq!(cache.get(&tree, &"key", &child, 5), Ok(Lookup::Present(&3)));
        assert_eq!(cache.get(&tree, &"key", &child, 6), Ok(Lookup::Deleted));
    }

    #[test]
    fn test_unknown_branch() {
        let (tree, trunk, mut cache) = setup();
        cache.set("key", &trunk, 0, 1);
        let err = cache
            .get(&tree, &"key", &BranchId::new("ghost"), 0)
            .unwrap_err();
        assert_eq!(err, Error::UnknownBranch(BranchId::new("ghost")));
    }

    #[test]
    fn test_keys_at() {
        let (tree, trunk, mut cache) = setup();
        cache.set("a", &trunk, 1, 1);
        cache.set("b", &trunk, 3, 2);
        cache.delete("a", &trunk, 4);

        let at = TimeCoordinate::trunk(3);
        let keys: Vec<_> = cache.keys_at(&tree, &at).copied().collect();
        assert_eq!(keys, vec!["a", "b"]);

        let at = TimeCoordinate::trunk(4);
        let keys: Vec<_> = cache.keys_at(&tree, &at).copied().collect();
        assert_eq!(keys, vec!["b"]);
    }

    #[test]
    fn test_forget_branch() {
        let (mut tree, trunk, mut cache) = setup();
        cache.set("a", &trunk, 1, 1);
        let child = tree.fork(&trunk, 1).unwrap();
        cache.set("a", &child, 2, 2);
        cache.set("b", &child, 2, 3);
        assert_eq!(cache.get(&tree, &"a", &child, 5), Ok(Lookup::Present(&2)));

        assert_eq!(cache.forget_branch(&child), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&tree, &"a", &child, 5), Ok(Lookup::Present(&1)));
        assert!(cache
            .get(&tree, &"b", &child, 5)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_serde_round_trip() {
        let (_, trunk, _) = setup();
        let mut cache: VersionedCache<(String, String), bool> = VersionedCache::new();
        cache.set(("book".into(), "rule".into()), &trunk, 1, true);
        cache.delete(("book".into(), "rule".into()), &trunk, 3);

        let text = ron::to_string(&cache).expect("serialize");
        let back: VersionedCache<(String, String), bool> =
            ron::from_str(&text).expect("deserialize");
        assert_eq!(back, cache);
    }
}
