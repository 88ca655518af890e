//! Rule storage collaborator
//!
//! `RuleStore` is everything the engine needs from persistent storage: rule
//! definitions, rulebook membership, branch/tick-versioned activation flags,
//! follower rulebook assignments and branch ancestry. Time-addressed queries
//! take the `BranchTree` so they resolve through ancestor branches exactly
//! like `VersionedCache` does.
//!
//! `MemoryStore` is the in-process implementation. The engine also uses one
//! as its write-through cache when caching is on, so cached and uncached
//! paths share the same code.

use crate::{Error, FunctionKind, FunctionName, Result, RuleName, RulebookName};
use chronicle_core::{BranchId, BranchTree, Lookup, Tick, VersionedCache};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Function names of one rule, per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLists {
    pub triggers: Vec<FunctionName>,
    pub prereqs: Vec<FunctionName>,
    pub actions: Vec<FunctionName>,
}

impl RuleLists {
    /// The list for one kind
    pub fn get(&self, kind: FunctionKind) -> &Vec<FunctionName> {
        match kind {
            FunctionKind::Trigger => &self.triggers,
            FunctionKind::Prereq => &self.prereqs,
            FunctionKind::Action => &self.actions,
        }
    }

    /// The mutable list for one kind
    pub fn get_mut(&mut self, kind: FunctionKind) -> &mut Vec<FunctionName> {
        match kind {
            FunctionKind::Trigger => &mut self.triggers,
            FunctionKind::Prereq => &mut self.prereqs,
            FunctionKind::Action => &mut self.actions,
        }
    }
}

/// One recorded activation change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivenessRecord {
    pub rulebook: RulebookName,
    pub rule: RuleName,
    pub branch: BranchId,
    pub tick: Tick,
    pub active: bool,
}

/// A rulebook slot; `None` is a placeholder left by padding
pub type RulebookSlot = Option<RuleName>;

/// Most placeholders a single `rulebook_set` may add past the end
pub const MAX_PADDING: usize = 1024;

/// Persistent-store collaborator used by the engine
pub trait RuleStore {
    // === Rules ===

    /// Create an empty rule; conflict if it exists
    fn create_rule(&mut self, rule: &RuleName) -> Result<()>;

    /// Check whether a rule exists
    fn have_rule(&self, rule: &RuleName) -> bool;

    /// Every rule name, in creation order
    fn all_rules(&self) -> Vec<RuleName>;

    /// Number of rules
    fn count_rules(&self) -> usize;

    /// Delete a rule and every rulebook slot naming it
    fn delete_rule(&mut self, rule: &RuleName) -> Result<()>;

    /// The ordered function names of one kind
    fn rule_functions(&self, rule: &RuleName, kind: FunctionKind) -> Result<Vec<FunctionName>>;

    /// Replace a whole function list
    fn replace_all_rule_functions(
        &mut self,
        rule: &RuleName,
        kind: FunctionKind,
        names: Vec<FunctionName>,
    ) -> Result<()>;

    /// Insert a function name at `i`, shifting later names
    fn insert_rule_function(
        &mut self,
        rule: &RuleName,
        kind: FunctionKind,
        i: usize,
        name: FunctionName,
    ) -> Result<()>;

    /// Append a function name
    fn append_rule_function(
        &mut self,
        rule: &RuleName,
        kind: FunctionKind,
        name: FunctionName,
    ) -> Result<()>;

    /// Overwrite the function name at `i`
    fn replace_rule_function(
        &mut self,
        rule: &RuleName,
        kind: FunctionKind,
        i: usize,
        name: FunctionName,
    ) -> Result<()>;

    /// Remove the function name at `i`
    fn delete_rule_function(&mut self, rule: &RuleName, kind: FunctionKind, i: usize) -> Result<()>;

    // === Rulebooks ===

    /// Slots of a rulebook in order; unknown rulebooks are empty
    fn rulebook_rules(&self, rulebook: &RulebookName) -> Vec<RulebookSlot>;

    /// Write `rule` at slot `i`, padding with up to [`MAX_PADDING`] placeholders
    fn rulebook_set(&mut self, rulebook: &RulebookName, i: usize, rule: &RuleName) -> Result<()>;

    /// Remove slot `i`
    fn rulebook_del(&mut self, rulebook: &RulebookName, i: usize) -> Result<()>;

    /// Open a placeholder at `i`, moving slots at and after `i` one position down
    fn rulebook_decr(&mut self, rulebook: &RulebookName, i: usize) -> Result<()>;

    /// Every rulebook ever written to
    fn list_rulebooks(&self) -> Vec<RulebookName>;

    /// Number of rules (not placeholders) in a rulebook
    fn count_rulebook_rules(&self, rulebook: &RulebookName) -> usize;

    // === Activation ===

    /// Record a rule's activeness in a rulebook from (branch, tick) onward
    fn set_rule_activeness(
        &mut self,
        rulebook: &RulebookName,
        rule: &RuleName,
        branch: &BranchId,
        tick: Tick,
        active: bool,
    ) -> Result<()>;

    /// Activeness of one rule; never-set collapses to `false`
    fn active_rule_rulebook(
        &self,
        tree: &BranchTree,
        rulebook: &RulebookName,
        rule: &RuleName,
        branch: &BranchId,
        tick: Tick,
    ) -> Result<bool>;

    /// Members active at (branch, tick), in rulebook order without repeats
    fn active_rules_rulebook(
        &self,
        tree: &BranchTree,
        rulebook: &RulebookName,
        branch: &BranchId,
        tick: Tick,
    ) -> Result<Vec<RuleName>> {
        let mut active: Vec<RuleName> = Vec::new();
        for rule in self.rulebook_rules(rulebook).into_iter().flatten() {
            if !active.contains(&rule)
                && self.active_rule_rulebook(tree, rulebook, &rule, branch, tick)?
            {
                active.push(rule);
            }
        }
        Ok(active)
    }

    /// Full activation history, for bulk loading
    fn rule_activeness_history(&self) -> Vec<ActivenessRecord>;

    // === Followers ===

    /// Rulebook assigned to a follower, if any
    fn follower_rulebook(&self, follower: &str) -> Option<RulebookName>;

    /// Assign a rulebook to a follower
    fn set_follower_rulebook(&mut self, follower: &str, rulebook: &RulebookName) -> Result<()>;

    /// Every follower assignment
    fn follower_rulebooks(&self) -> Vec<(String, RulebookName)>;

    // === Branches ===

    /// Persist branch ancestry
    fn save_branches(&mut self, tree: &BranchTree) -> Result<()>;

    /// Saved branch ancestry, if any was saved
    fn load_branches(&self) -> Option<BranchTree>;
}

/// In-memory `RuleStore`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    rules: IndexMap<RuleName, RuleLists>,
    rulebooks: IndexMap<RulebookName, Vec<RulebookSlot>>,
    activeness: VersionedCache<(RulebookName, RuleName), bool>,
    followers: IndexMap<String, RulebookName>,
    branches: Option<BranchTree>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that already knows its branch ancestry
    pub fn with_branches(tree: BranchTree) -> Self {
        Self {
            branches: Some(tree),
            ..Self::default()
        }
    }

    /// Copy everything another store holds
    pub fn snapshot(store: &dyn RuleStore) -> Result<Self> {
        let mut copy = Self::new();
        for rule in store.all_rules() {
            let mut lists = RuleLists::default();
            for kind in FunctionKind::ALL {
                *lists.get_mut(kind) = store.rule_functions(&rule, kind)?;
            }
            copy.rules.insert(rule, lists);
        }
        for rulebook in store.list_rulebooks() {
            let slots = store.rulebook_rules(&rulebook);
            copy.rulebooks.insert(rulebook, slots);
        }
        for record in store.rule_activeness_history() {
            let key = (record.rulebook, record.rule);
            copy.activeness
                .set(key, &record.branch, record.tick, record.active);
        }
        copy.followers.extend(store.follower_rulebooks());
        copy.branches = store.load_branches();
        Ok(copy)
    }

    /// Serialize the whole store as pretty RON
    pub fn to_ron(&self) -> Result<String> {
        let pretty = ron::ser::PrettyConfig::default();
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Load a store saved with `to_ron`
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    fn lists(&self, rule: &RuleName) -> Result<&RuleLists> {
        self.rules
            .get(rule)
            .ok_or_else(|| Error::RuleNotFound(rule.clone()))
    }

    fn lists_mut(&mut self, rule: &RuleName) -> Result<&mut RuleLists> {
        self.rules
            .get_mut(rule)
            .ok_or_else(|| Error::RuleNotFound(rule.clone()))
    }
}

/// Collapse a versioned activation lookup to a flag
fn resolve_activeness(
    cache: &VersionedCache<(RulebookName, RuleName), bool>,
    tree: &BranchTree,
    rulebook: &RulebookName,
    rule: &RuleName,
    branch: &BranchId,
    tick: Tick,
) -> Result<bool> {
    let key = (rulebook.clone(), rule.clone());
    match cache.get(tree, &key, branch, tick) {
        Ok(Lookup::Present(active)) => Ok(*active),
        Ok(Lookup::Deleted) => Ok(false),
        Err(chronicle_core::Error::NotFound(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn check_index(what: &str, i: usize, len: usize) -> Result<()> {
    if i < len {
        Ok(())
    } else {
        Err(Error::out_of_range(what, i, len))
    }
}

impl RuleStore for MemoryStore {
    fn create_rule(&mut self, rule: &RuleName) -> Result<()> {
        if self.rules.contains_key(rule) {
            return Err(Error::RuleConflict(rule.clone()));
        }
        self.rules.insert(rule.clone(), RuleLists::default());
        Ok(())
    }

    fn have_rule(&self, rule: &RuleName) -> bool {
        self.rules.contains_key(rule)
    }

    fn all_rules(&self) -> Vec<RuleName> {
        self.rules.keys().cloned().collect()
    }

    fn count_rules(&self) -> usize {
        self.rules.len()
    }

    fn delete_rule(&mut self, rule: &RuleName) -> Result<()> {
        if self.rules.shift_remove(rule).is_none() {
            return Err(Error::RuleNotFound(rule.clone()));
        }
        for slots in self.rulebooks.values_mut() {
            slots.retain(|slot| slot.as_ref() != Some(rule));
        }
        Ok(())
    }

    fn rule_functions(&self, rule: &RuleName, kind: FunctionKind) -> Result<Vec<FunctionName>> {
        Ok(self.lists(rule)?.get(kind).clone())
    }

    fn replace_all_rule_functions(
        &mut self,
        rule: &RuleName,
        kind: FunctionKind,
        names: Vec<FunctionName>,
    ) -> Result<()> {
        *self.lists_mut(rule)?.get_mut(kind) = names;
        Ok(())
    }

    fn insert_rule_function(
        &mut self,
        rule: &RuleName,
        kind: FunctionKind,
        i: usize,
        name: FunctionName,
    ) -> Result<()> {
        let list = self.lists_mut(rule)?.get_mut(kind);
        if i > list.len() {
            let what = format!("{} list of {}", kind, rule);
            return Err(Error::out_of_range(what, i, list.len()));
        }
        list.insert(i, name);
        Ok(())
    }

    fn append_rule_function(
        &mut self,
        rule: &RuleName,
        kind: FunctionKind,
        name: FunctionName,
    ) -> Result<()> {
        self.lists_mut(rule)?.get_mut(kind).push(name);
        Ok(())
    }

    fn replace_rule_function(
        &mut self,
        rule: &RuleName,
        kind: FunctionKind,
        i: usize,
        name: FunctionName,
    ) -> Result<()> {
        let list = self.lists_mut(rule)?.get_mut(kind);
        check_index(&format!("{} list of {}", kind, rule), i, list.len())?;
        list[i] = name;
        Ok(())
    }

    fn delete_rule_function(
        &mut self,
        rule: &RuleName,
        kind: FunctionKind,
        i: usize,
    ) -> Result<()> {
        let list = self.lists_mut(rule)?.get_mut(kind);
        check_index(&format!("{} list of {}", kind, rule), i, list.len())?;
        list.remove(i);
        Ok(())
    }

    fn rulebook_rules(&self, rulebook: &RulebookName) -> Vec<RulebookSlot> {
        self.rulebooks.get(rulebook).cloned().unwrap_or_default()
    }

    fn rulebook_set(&mut self, rulebook: &RulebookName, i: usize, rule: &RuleName) -> Result<()> {
        if !self.rules.contains_key(rule) {
            return Err(Error::RuleNotFound(rule.clone()));
        }
        let len = self.rulebooks.get(rulebook).map_or(0, Vec::len);
        if i > len.saturating_add(MAX_PADDING) {
            let what = format!("rulebook {}", rulebook);
            return Err(Error::out_of_range(what, i, len));
        }
        let slots = self.rulebooks.entry(rulebook.clone()).or_default();
        if slots.len() <= i {
            slots.resize(i + 1, None);
        }
        slots[i] = Some(rule.clone());
        Ok(())
    }

    fn rulebook_del(&mut self, rulebook: &RulebookName, i: usize) -> Result<()> {
        let len = self.rulebooks.get(rulebook).map_or(0, Vec::len);
        check_index(&format!("rulebook {}", rulebook), i, len)?;
        if let Some(slots) = self.rulebooks.get_mut(rulebook) {
            slots.remove(i);
        }
        Ok(())
    }

    fn rulebook_decr(&mut self, rulebook: &RulebookName, i: usize) -> Result<()> {
        let slots = self.rulebooks.entry(rulebook.clone()).or_default();
        if i < slots.len() {
            slots.insert(i, None);
        }
        Ok(())
    }

    fn list_rulebooks(&self) -> Vec<RulebookName> {
        self.rulebooks.keys().cloned().collect()
    }

    fn count_rulebook_rules(&self, rulebook: &RulebookName) -> usize {
        self.rulebooks
            .get(rulebook)
            .map_or(0, |slots| slots.iter().flatten().count())
    }

    fn set_rule_activeness(
        &mut self,
        rulebook: &RulebookName,
        rule: &RuleName,
        branch: &BranchId,
        tick: Tick,
        active: bool,
    ) -> Result<()> {
        self.activeness
            .set((rulebook.clone(), rule.clone()), branch, tick, active);
        Ok(())
    }

    fn active_rule_rulebook(
        &self,
        tree: &BranchTree,
        rulebook: &RulebookName,
        rule: &RuleName,
        branch: &BranchId,
        tick: Tick,
    ) -> Result<bool> {
        resolve_activeness(&self.activeness, tree, rulebook, rule, branch, tick)
    }

    fn rule_activeness_history(&self) -> Vec<ActivenessRecord> {
        self.activeness
            .records()
            .filter_map(|((rulebook, rule), branch, tick, slot)| {
                slot.as_value().map(|active| ActivenessRecord {
                    rulebook: rulebook.clone(),
                    rule: rule.clone(),
                    branch: branch.clone(),
                    tick,
                    active: *active,
                })
            })
            .collect()
    }

    fn follower_rulebook(&self, follower: &str) -> Option<RulebookName> {
        self.followers.get(follower).cloned()
    }

    fn set_follower_rulebook(&mut self, follower: &str, rulebook: &RulebookName) -> Result<()> {
        self.followers.insert(follower.to_string(), rulebook.clone());
        Ok(())
    }

    fn follower_rulebooks(&self) -> Vec<(String, RulebookName)> {
        self.followers
            .iter()
            .map(|(follower, rulebook)| (follower.clone(), rulebook.clone()))
            .collect()
    }

    fn save_branches(&mut self, tree: &BranchTree) -> Result<()> {
        self.branches = Some(tree.clone());
        Ok(())
    }

    fn load_branches(&self) -> Option<BranchTree> {
        self.branches.clone()
    }
}
