//! Rules: ordered triggers, prereqs and actions
//!
//! A `Rule` is a handle naming a rule in the engine's store. Evaluation runs
//! in three stages against the current time:
//!
//! 1. Triggers are scanned in order; the first true one lets the rule proceed.
//! 2. Prereqs are scanned in order; the first false one stops the rule.
//! 3. Actions run in order and their return values are collected.
//!
//! Trigger and prereq results are cached per (function, branch, tick, args).
//! Actions are never cached. The time coordinate is restored after every call
//! into a behavior function.

use crate::function::{ActionFn, FunctionHandle, Predicate};
use crate::{Engine, Error, FunctionKind, FunctionName, Functions, Result, RuleName};
use chronicle_core::{BranchId, Tick, TimeCoordinate, Value};
use indexmap::IndexMap;

/// Key of one cached trigger or prereq result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub function: FunctionName,
    pub branch: BranchId,
    pub tick: Tick,
    pub args: Vec<Value>,
}

impl ResultKey {
    fn new(function: &FunctionName, at: &TimeCoordinate, args: &[Value]) -> Self {
        Self {
            function: function.clone(),
            branch: at.branch.clone(),
            tick: at.tick,
            args: args.to_vec(),
        }
    }
}

/// Cached results of one kind of predicate, oldest first
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: IndexMap<ResultKey, bool>,
}

impl ResultCache {
    pub fn get(&self, key: &ResultKey) -> Option<bool> {
        self.entries.get(key).copied()
    }

    /// Record a result, evicting the oldest entries beyond `capacity`
    pub fn insert(&mut self, key: ResultKey, result: bool, capacity: Option<usize>) {
        if let Some(capacity) = capacity {
            while self.entries.len() >= capacity && !self.entries.contains_key(&key) {
                if self.entries.shift_remove_index(0).is_none() {
                    break;
                }
            }
        }
        self.entries.insert(key, result);
    }

    pub fn forget_branch(&mut self, branch: &BranchId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.branch != *branch);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Trigger and prereq result caches of one rule
#[derive(Debug, Clone, Default)]
pub struct RuleResults {
    triggers: ResultCache,
    prereqs: ResultCache,
}

impl RuleResults {
    /// Cache for `kind`; actions have none
    pub fn get(&self, kind: FunctionKind) -> Option<&ResultCache> {
        match kind {
            FunctionKind::Trigger => Some(&self.triggers),
            FunctionKind::Prereq => Some(&self.prereqs),
            FunctionKind::Action => None,
        }
    }

    pub fn get_mut(&mut self, kind: FunctionKind) -> Option<&mut ResultCache> {
        match kind {
            FunctionKind::Trigger => Some(&mut self.triggers),
            FunctionKind::Prereq => Some(&mut self.prereqs),
            FunctionKind::Action => None,
        }
    }

    pub fn forget_branch(&mut self, branch: &BranchId) -> usize {
        self.triggers.forget_branch(branch) + self.prereqs.forget_branch(branch)
    }
}

/// Handle to a named rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    name: RuleName,
}

impl Rule {
    /// Create a new rule with empty function lists
    pub fn create(engine: &mut Engine, name: impl Into<RuleName>) -> Result<Self> {
        let name = name.into();
        if engine.has_rule(&name) {
            return Err(Error::RuleConflict(name));
        }
        engine.write(|store| store.create_rule(&name))?;
        tracing::debug!(rule = %name, "created rule");
        Ok(Self { name })
    }

    /// Get an existing rule
    pub fn get(engine: &Engine, name: impl Into<RuleName>) -> Result<Self> {
        let name = name.into();
        if engine.has_rule(&name) {
            Ok(Self { name })
        } else {
            Err(Error::RuleNotFound(name))
        }
    }

    /// Get a rule, creating it on first reference
    pub fn ensure(engine: &mut Engine, name: impl Into<RuleName>) -> Result<Self> {
        let name = name.into();
        if engine.has_rule(&name) {
            Ok(Self { name })
        } else {
            Self::create(engine, name)
        }
    }

    /// The rule's name
    pub fn name(&self) -> &RuleName {
        &self.name
    }

    /// Copy this rule's function lists into a new rule; caches start empty
    pub fn duplicate(&self, engine: &mut Engine, new_name: impl Into<RuleName>) -> Result<Rule> {
        let new_name = new_name.into();
        if engine.has_rule(&new_name) {
            return Err(Error::RuleConflict(new_name));
        }
        let mut lists = Vec::with_capacity(FunctionKind::ALL.len());
        for kind in FunctionKind::ALL {
            lists.push((kind, self.functions(engine, kind)?));
        }
        let copy = Self::create(engine, new_name)?;
        for (kind, names) in lists {
            engine.write(|store| {
                store.replace_all_rule_functions(&copy.name, kind, names.clone())
            })?;
        }
        Ok(copy)
    }

    /// Delete this rule from the store and from every rulebook listing it
    pub fn delete(self, engine: &mut Engine) -> Result<()> {
        if !engine.has_rule(&self.name) {
            return Err(Error::RuleNotFound(self.name));
        }
        let view: &Engine = engine;
        let affected: Vec<_> = view
            .rulebooks()
            .into_iter()
            .filter(|book| book.contains(view, &self.name))
            .collect();
        engine.write(|store| store.delete_rule(&self.name))?;
        engine.drop_results(&self.name);
        tracing::debug!(rule = %self.name, rulebooks = affected.len(), "deleted rule");
        for book in &affected {
            engine.dispatch_rulebook(book);
        }
        Ok(())
    }

    // === Function lists ===

    /// Ordered function names of one kind
    pub fn functions(&self, engine: &Engine, kind: FunctionKind) -> Result<Vec<FunctionName>> {
        engine.reader().rule_functions(&self.name, kind)
    }

    pub fn triggers(&self, engine: &Engine) -> Result<Vec<FunctionName>> {
        self.functions(engine, FunctionKind::Trigger)
    }

    pub fn prereqs(&self, engine: &Engine) -> Result<Vec<FunctionName>> {
        self.functions(engine, FunctionKind::Prereq)
    }

    pub fn actions(&self, engine: &Engine) -> Result<Vec<FunctionName>> {
        self.functions(engine, FunctionKind::Action)
    }

    /// Replace a whole function list; every name must be registered
    pub fn set_functions<I, N>(
        &self,
        engine: &mut Engine,
        kind: FunctionKind,
        names: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = N>,
        N: Into<FunctionName>,
    {
        let names: Vec<FunctionName> = names.into_iter().map(Into::into).collect();
        for name in &names {
            engine.functions().require(kind, name)?;
        }
        engine.write(|store| {
            store.replace_all_rule_functions(&self.name, kind, names.clone())
        })
    }

    /// Append a registered function
    pub fn append(
        &self,
        engine: &mut Engine,
        kind: FunctionKind,
        name: impl Into<FunctionName>,
    ) -> Result<()> {
        let name = name.into();
        engine.functions().require(kind, &name)?;
        engine.write(|store| {
            store.append_rule_function(&self.name, kind, name.clone())
        })
    }

    /// Insert a registered function at `i`
    pub fn insert(
        &self,
        engine: &mut Engine,
        kind: FunctionKind,
        i: usize,
        name: impl Into<FunctionName>,
    ) -> Result<()> {
        let name = name.into();
        engine.functions().require(kind, &name)?;
        engine.write(|store| {
            store.insert_rule_function(&self.name, kind, i, name.clone())
        })
    }

    /// Overwrite the function at `i`
    pub fn replace(
        &self,
        engine: &mut Engine,
        kind: FunctionKind,
        i: usize,
        name: impl Into<FunctionName>,
    ) -> Result<()> {
        let name = name.into();
        engine.functions().require(kind, &name)?;
        engine.write(|store| {
            store.replace_rule_function(&self.name, kind, i, name.clone())
        })
    }

    /// Remove the function at `i`
    pub fn remove(&self, engine: &mut Engine, kind: FunctionKind, i: usize) -> Result<()> {
        engine.write(|store| store.delete_rule_function(&self.name, kind, i))
    }

    /// Register `f` as a trigger and append it
    pub fn trigger(
        &self,
        engine: &mut Engine,
        name: impl Into<FunctionName>,
        f: Predicate,
    ) -> Result<FunctionHandle> {
        self.bind_predicate(engine, FunctionKind::Trigger, name.into(), f)
    }

    /// Register `f` as a prereq and append it
    pub fn prereq(
        &self,
        engine: &mut Engine,
        name: impl Into<FunctionName>,
        f: Predicate,
    ) -> Result<FunctionHandle> {
        self.bind_predicate(engine, FunctionKind::Prereq, name.into(), f)
    }

    /// Register `f` as an action and append it
    pub fn action(
        &self,
        engine: &mut Engine,
        name: impl Into<FunctionName>,
        f: ActionFn,
    ) -> Result<FunctionHandle> {
        let name = name.into();
        self.require_exists(engine)?;
        let handle = engine.functions_mut().actions_mut().register(name, f)?;
        self.append(engine, FunctionKind::Action, handle.name.clone())?;
        Ok(handle)
    }

    fn bind_predicate(
        &self,
        engine: &mut Engine,
        kind: FunctionKind,
        name: FunctionName,
        f: Predicate,
    ) -> Result<FunctionHandle> {
        self.require_exists(engine)?;
        let functions = engine.functions_mut();
        let registry = match kind {
            FunctionKind::Trigger => functions.triggers_mut(),
            _ => functions.prereqs_mut(),
        };
        let handle = registry.register(name, f)?;
        self.append(engine, kind, handle.name.clone())?;
        Ok(handle)
    }

    fn require_exists(&self, engine: &Engine) -> Result<()> {
        if engine.has_rule(&self.name) {
            Ok(())
        } else {
            Err(Error::RuleNotFound(self.name.clone()))
        }
    }

    /// Make the built-in `always` trigger this rule's only trigger
    pub fn always(&self, engine: &mut Engine) -> Result<()> {
        self.set_functions(engine, FunctionKind::Trigger, [Functions::ALWAYS])
    }

    // === Evaluation ===

    /// Evaluate the rule; the action results, or nothing if it did not fire
    pub fn evaluate(&self, engine: &mut Engine, args: &[Value]) -> Result<Vec<Value>> {
        Ok(self.fire(engine, args)?.unwrap_or_default())
    }

    /// Evaluate the rule; `None` if it did not fire
    ///
    /// Unlike `evaluate`, this tells a rule without actions that fired from
    /// one that did not.
    pub fn fire(&self, engine: &mut Engine, args: &[Value]) -> Result<Option<Vec<Value>>> {
        if !self.check_triggers(engine, args)? {
            tracing::trace!(rule = %self.name, "no trigger fired");
            return Ok(None);
        }
        if !self.check_prereqs(engine, args)? {
            tracing::trace!(rule = %self.name, "prereq failed");
            return Ok(None);
        }
        self.run_actions(engine, args).map(Some)
    }

    /// True if any trigger is true; stops at the first true one
    pub fn check_triggers(&self, engine: &mut Engine, args: &[Value]) -> Result<bool> {
        self.scan(engine, FunctionKind::Trigger, args, true)
    }

    /// True if every prereq is true; stops at the first false one
    pub fn check_prereqs(&self, engine: &mut Engine, args: &[Value]) -> Result<bool> {
        self.scan(engine, FunctionKind::Prereq, args, false)
    }

    /// Scan predicates of `kind` until one returns `decisive`
    fn scan(
        &self,
        engine: &mut Engine,
        kind: FunctionKind,
        args: &[Value],
        decisive: bool,
    ) -> Result<bool> {
        let start = engine.time().clone();
        for name in self.functions(engine, kind)? {
            let key = ResultKey::new(&name, &start, args);
            let result = match engine.cached_result(&self.name, kind, &key) {
                Some(result) => {
                    tracing::trace!(
                        rule = %self.name,
                        %kind,
                        function = %name,
                        result,
                        "cached result"
                    );
                    result
                }
                None => {
                    let f = engine
                        .functions()
                        .predicates(kind)
                        .ok_or_else(|| Error::FunctionNotFound {
                            kind,
                            name: name.clone(),
                        })?
                        .lookup(&name)?;
                    let result = f(engine, args);
                    engine.restore_time(&start);
                    tracing::trace!(rule = %self.name, %kind, function = %name, result, "called");
                    engine.record_result(&self.name, kind, key, result);
                    result
                }
            };
            if result == decisive {
                return Ok(decisive);
            }
        }
        Ok(!decisive)
    }

    /// Run every action in order and collect the results
    pub fn run_actions(&self, engine: &mut Engine, args: &[Value]) -> Result<Vec<Value>> {
        let start = engine.time().clone();
        let names = self.functions(engine, FunctionKind::Action)?;
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let f = engine.functions().actions().lookup(&name)?;
            results.push(f(engine, args));
            engine.restore_time(&start);
            tracing::trace!(rule = %self.name, action = %name, "ran action");
        }
        Ok(results)
    }

    /// Number of cached results of one kind
    pub fn cached_results(&self, engine: &Engine, kind: FunctionKind) -> usize {
        engine
            .results(&self.name)
            .and_then(|results| results.get(kind))
            .map_or(0, ResultCache::len)
    }

    /// Forget every cached result of this rule
    pub fn clear_results(&self, engine: &mut Engine) {
        engine.drop_results(&self.name);
    }
}
