//! Engine - the execution context rules run in
//!
//! The engine owns everything a simulation session needs: the current time
//! coordinate, branch ancestry, the three function registries, the store
//! collaborator, the optional in-memory cache of that store, per-rule result
//! caches and the versioned world facts.
//!
//! ## Caching
//!
//! With caching on, the engine keeps a `MemoryStore` mirror of the store.
//! Writes go to the store first and then to the mirror; reads are served from
//! the mirror. With caching off every read goes to the store. Both paths run
//! the same store operations, so they answer identically for identical
//! history.
//!
//! ```
//! use chronicle_rules::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::default());
//! engine.advance();
//! let child = engine.fork().unwrap();
//! assert_eq!(engine.time().branch, child);
//! assert_eq!(engine.time().tick, 1);
//! ```

use crate::rule::{ResultKey, RuleResults};
use crate::store::{MemoryStore, RuleStore};
use crate::{
    EngineConfig, FactKey, FunctionKind, Functions, Result, RuleBook, RuleName, RulebookName,
};
use chronicle_core::{BranchId, BranchTree, Lookup, Tick, TimeCoordinate, Value, VersionedCache};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

/// Callback run after a structural change to one rulebook
pub type RulebookListener = Box<dyn FnMut(&RuleBook)>;

/// Callback run when a follower is assigned a rulebook
pub type FollowerListener = Box<dyn FnMut(&str, &RulebookName)>;

/// Execution context for rules
pub struct Engine {
    config: EngineConfig,
    time: TimeCoordinate,
    branches: BranchTree,
    functions: Functions,
    store: Box<dyn RuleStore>,
    cache: Option<MemoryStore>,
    results: HashMap<RuleName, RuleResults>,
    facts: VersionedCache<FactKey, Value>,
    rulebook_listeners: IndexMap<RulebookName, Vec<RulebookListener>>,
    follower_listeners: Vec<FollowerListener>,
}

impl Engine {
    /// Create an engine over a fresh in-memory store
    pub fn new(config: EngineConfig) -> Self {
        let branches = BranchTree::new(config.trunk.clone());
        let store = MemoryStore::with_branches(branches.clone());
        let cache = config.caching.then(|| store.clone());
        Self {
            time: TimeCoordinate::new(config.trunk.clone(), 0),
            config,
            branches,
            functions: Functions::new(),
            store: Box::new(store),
            cache,
            results: HashMap::new(),
            facts: VersionedCache::new(),
            rulebook_listeners: IndexMap::new(),
            follower_listeners: Vec::new(),
        }
    }

    /// Create an engine over an existing store
    ///
    /// Branch ancestry is loaded from the store when it has any; otherwise a
    /// tree rooted at the configured trunk is saved to it. Time starts at
    /// tick 0 of the root branch.
    pub fn with_store(config: EngineConfig, mut store: Box<dyn RuleStore>) -> Result<Self> {
        let branches = match store.load_branches() {
            Some(tree) => tree,
            None => {
                let tree = BranchTree::new(config.trunk.clone());
                store.save_branches(&tree)?;
                tree
            }
        };
        let cache = if config.caching {
            Some(MemoryStore::snapshot(store.as_ref())?)
        } else {
            None
        };
        tracing::debug!(
            rules = store.count_rules(),
            branches = branches.len(),
            caching = config.caching,
            "opened engine over existing store"
        );
        Ok(Self {
            time: TimeCoordinate::new(branches.trunk().clone(), 0),
            config,
            branches,
            functions: Functions::new(),
            store,
            cache,
            results: HashMap::new(),
            facts: VersionedCache::new(),
            rulebook_listeners: IndexMap::new(),
            follower_listeners: Vec::new(),
        })
    }

    /// Tear down the engine, handing back its store
    pub fn into_store(self) -> Box<dyn RuleStore> {
        self.store
    }

    /// Get the configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // === Time ===

    /// The current time coordinate
    pub fn time(&self) -> &TimeCoordinate {
        &self.time
    }

    /// Move to another point in time
    pub fn set_time(&mut self, time: TimeCoordinate) -> Result<()> {
        if !self.branches.contains(&time.branch) {
            return Err(chronicle_core::Error::UnknownBranch(time.branch).into());
        }
        self.time = time;
        Ok(())
    }

    /// Move to another tick of the current branch
    pub fn set_tick(&mut self, tick: Tick) {
        self.time.tick = tick;
    }

    /// Advance one tick and return the new tick
    pub fn advance(&mut self) -> Tick {
        self.time.advance()
    }

    /// Fork the current branch at the current tick and move onto the child
    pub fn fork(&mut self) -> Result<BranchId> {
        let branch = self.branches.fork(&self.time.branch, self.time.tick)?;
        self.enter_fork(branch)
    }

    /// Like `fork`, choosing the child's name
    pub fn fork_named(&mut self, name: impl Into<BranchId>) -> Result<BranchId> {
        let branch = self.branches.fork_named(name, &self.time.branch, self.time.tick)?;
        self.enter_fork(branch)
    }

    fn enter_fork(&mut self, branch: BranchId) -> Result<BranchId> {
        let tree = self.branches.clone();
        self.write(|store| store.save_branches(&tree))?;
        self.time.branch = branch.clone();
        Ok(branch)
    }

    /// Branch ancestry
    pub fn branches(&self) -> &BranchTree {
        &self.branches
    }

    pub(crate) fn restore_time(&mut self, start: &TimeCoordinate) {
        if self.time != *start {
            tracing::warn!(
                moved_to = %self.time,
                restored = %start,
                "behavior function moved time; restoring"
            );
            self.time = start.clone();
        }
    }

    // === Caching ===

    /// Whether store lookups are served from memory
    pub fn caching(&self) -> bool {
        self.cache.is_some()
    }

    /// Switch caching on or off
    ///
    /// Turning it on loads a fresh copy of the store; turning it off drops it.
    pub fn set_caching(&mut self, caching: bool) -> Result<()> {
        if caching == self.caching() {
            return Ok(());
        }
        self.cache = if caching {
            Some(MemoryStore::snapshot(self.store.as_ref())?)
        } else {
            None
        };
        self.config.caching = caching;
        tracing::debug!(caching, "switched caching mode");
        Ok(())
    }

    /// The in-memory copy of the store, present only while caching
    pub fn cache(&self) -> Option<&MemoryStore> {
        self.cache.as_ref()
    }

    /// Store to read from: the cache when caching, the store otherwise
    pub fn reader(&self) -> &dyn RuleStore {
        match &self.cache {
            Some(cache) => cache as &dyn RuleStore,
            None => self.store.as_ref(),
        }
    }

    /// Apply a write to the store, then to the cache if there is one
    pub(crate) fn write<T>(
        &mut self,
        mut op: impl FnMut(&mut dyn RuleStore) -> Result<T>,
    ) -> Result<T> {
        let out = op(self.store.as_mut())?;
        if let Some(cache) = self.cache.as_mut() {
            op(cache)?;
        }
        Ok(out)
    }

    // === Functions ===

    /// Trigger, prereq and action registries
    pub fn functions(&self) -> &Functions {
        &self.functions
    }

    /// Mutable registries
    pub fn functions_mut(&mut self) -> &mut Functions {
        &mut self.functions
    }

    // === Facts ===

    /// Value of a fact at the current time
    pub fn fact(&self, key: &FactKey) -> Option<&Value> {
        self.facts.value_at(&self.branches, key, &self.time)
    }

    /// Value of a fact at another time
    pub fn fact_at(&self, key: &FactKey, at: &TimeCoordinate) -> Option<&Value> {
        self.facts.value_at(&self.branches, key, at)
    }

    /// Full lookup of a fact at the current time, telling deleted from never set
    pub fn fact_lookup(&self, key: &FactKey) -> Result<Lookup<&Value>> {
        Ok(self.facts.get_at(&self.branches, key, &self.time)?)
    }

    /// Set a fact from the current time onward
    pub fn set_fact(&mut self, key: FactKey, value: impl Into<Value>) {
        self.facts.set(key, &self.time.branch, self.time.tick, value.into());
    }

    /// Delete a fact from the current time onward
    pub fn delete_fact(&mut self, key: FactKey) {
        self.facts.delete(key, &self.time.branch, self.time.tick);
    }

    /// Every fact
    pub fn facts(&self) -> &VersionedCache<FactKey, Value> {
        &self.facts
    }

    // === Rules ===

    /// Check whether a rule exists
    pub fn has_rule(&self, rule: &RuleName) -> bool {
        self.reader().have_rule(rule)
    }

    /// Every rule name, in creation order
    pub fn rule_names(&self) -> Vec<RuleName> {
        self.reader().all_rules()
    }

    /// Number of rules
    pub fn count_rules(&self) -> usize {
        self.reader().count_rules()
    }

    /// Every rulebook that has been written to
    pub fn rulebooks(&self) -> Vec<RuleBook> {
        self.reader()
            .list_rulebooks()
            .into_iter()
            .map(RuleBook::new)
            .collect()
    }

    /// Rulebook recorded for a follower, if any
    pub fn follower_rulebook(&self, follower: &str) -> Option<RulebookName> {
        self.reader().follower_rulebook(follower)
    }

    /// Record which rulebook a follower uses
    pub fn set_follower_rulebook(&mut self, follower: &str, rulebook: &RulebookName) -> Result<()> {
        self.write(|store| store.set_follower_rulebook(follower, rulebook))
    }

    // === Result caches ===

    pub(crate) fn cached_result(
        &self,
        rule: &RuleName,
        kind: FunctionKind,
        key: &ResultKey,
    ) -> Option<bool> {
        self.results.get(rule)?.get(kind)?.get(key)
    }

    pub(crate) fn record_result(
        &mut self,
        rule: &RuleName,
        kind: FunctionKind,
        key: ResultKey,
        result: bool,
    ) {
        let capacity = self.config.result_cache.capacity();
        if let Some(cache) = self.results.entry(rule.clone()).or_default().get_mut(kind) {
            cache.insert(key, result, capacity);
        }
    }

    pub(crate) fn results(&self, rule: &RuleName) -> Option<&RuleResults> {
        self.results.get(rule)
    }

    pub(crate) fn drop_results(&mut self, rule: &RuleName) {
        self.results.remove(rule);
    }

    /// Drop every cached trigger/prereq result recorded on a branch
    ///
    /// Returns how many results were dropped.
    pub fn forget_branch(&mut self, branch: &BranchId) -> usize {
        let dropped: usize = self
            .results
            .values_mut()
            .map(|results| results.forget_branch(branch))
            .sum();
        tracing::debug!(branch = %branch, dropped, "forgot cached results for branch");
        dropped
    }

    /// Drop every cached trigger/prereq result
    pub fn clear_results(&mut self) {
        self.results.clear();
    }

    // === Listeners ===

    /// Call `f` after every structural change to the named rulebook
    pub fn rulebook_listener(
        &mut self,
        rulebook: impl Into<RulebookName>,
        f: impl FnMut(&RuleBook) + 'static,
    ) {
        self.rulebook_listeners
            .entry(rulebook.into())
            .or_default()
            .push(Box::new(f));
    }

    /// Call `f` whenever a follower is assigned a rulebook
    pub fn follower_listener(&mut self, f: impl FnMut(&str, &RulebookName) + 'static) {
        self.follower_listeners.push(Box::new(f));
    }

    pub(crate) fn dispatch_rulebook(&mut self, rulebook: &RuleBook) {
        if let Some(listeners) = self.rulebook_listeners.get_mut(rulebook.name()) {
            for listener in listeners.iter_mut() {
                listener(rulebook);
            }
        }
    }

    pub(crate) fn dispatch_follower(&mut self, follower: &str, rulebook: &RulebookName) {
        for listener in self.follower_listeners.iter_mut() {
            listener(follower, rulebook);
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("time", &self.time)
            .field("caching", &self.caching())
            .field("branches", &self.branches.len())
            .field("functions", &self.functions)
            .field("rules", &self.count_rules())
            .field("facts", &self.facts.len())
            .finish()
    }
}
