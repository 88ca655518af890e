//! Named behavior functions: triggers, prereqs and actions
//!
//! Rules refer to behavior by name. Each kind of function lives in its own
//! `FunctionRegistry`, and `FunctionKind` selects between them wherever an
//! operation applies to all three.
//!
//! Function identity is the identity of the shared handle: registering the
//! same `Rc` twice under one name is a no-op, while registering a different
//! body under a taken name is a conflict.

use crate::{Engine, Error, FunctionName, Result};
use chronicle_core::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// The three kinds of function a rule is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Any true trigger lets a rule be considered
    Trigger,
    /// All prereqs must be true for a rule to fire
    Prereq,
    /// Side-effecting work done when a rule fires
    Action,
}

impl FunctionKind {
    /// All kinds in evaluation order
    pub const ALL: [FunctionKind; 3] = [
        FunctionKind::Trigger,
        FunctionKind::Prereq,
        FunctionKind::Action,
    ];

    /// Lowercase name, as used in messages
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::Trigger => "trigger",
            FunctionKind::Prereq => "prereq",
            FunctionKind::Action => "action",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature of triggers and prereqs
pub type PredicateFn = dyn Fn(&mut Engine, &[Value]) -> bool;

/// Signature of actions
pub type ActionFnBody = dyn Fn(&mut Engine, &[Value]) -> Value;

/// Shared handle to a trigger or prereq
pub type Predicate = Rc<PredicateFn>;

/// Shared handle to an action
pub type ActionFn = Rc<ActionFnBody>;

/// Wrap a closure as a trigger or prereq
pub fn predicate<F>(f: F) -> Predicate
where
    F: Fn(&mut Engine, &[Value]) -> bool + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as an action
pub fn action<F>(f: F) -> ActionFn
where
    F: Fn(&mut Engine, &[Value]) -> Value + 'static,
{
    Rc::new(f)
}

/// Proof that a function was bound under a name, produced at registration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionHandle {
    pub kind: FunctionKind,
    pub name: FunctionName,
}

/// Name to function mapping for one kind of function
pub struct FunctionRegistry<F: ?Sized> {
    kind: FunctionKind,
    functions: IndexMap<FunctionName, Rc<F>>,
}

impl<F: ?Sized> FunctionRegistry<F> {
    /// Create an empty registry for one kind
    pub fn new(kind: FunctionKind) -> Self {
        Self {
            kind,
            functions: IndexMap::new(),
        }
    }

    /// The kind of function held here
    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    /// Fail if `name` is bound to something other than `function`
    pub fn check(&self, name: &FunctionName, function: &Rc<F>) -> Result<()> {
        match self.functions.get(name) {
            Some(existing) if !Rc::ptr_eq(existing, function) => Err(Error::FunctionConflict {
                kind: self.kind,
                name: name.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Bind `name` to `function`
    ///
    /// Re-registering the identical handle is a no-op.
    pub fn register(
        &mut self,
        name: impl Into<FunctionName>,
        function: Rc<F>,
    ) -> Result<FunctionHandle> {
        let name = name.into();
        self.check(&name, &function)?;
        if !self.functions.contains_key(&name) {
            tracing::debug!(kind = %self.kind, name = %name, "registered function");
            self.functions.insert(name.clone(), function);
        }
        Ok(FunctionHandle {
            kind: self.kind,
            name,
        })
    }

    /// Remove a binding so the name can be reused
    pub fn unregister(&mut self, name: &FunctionName) -> Option<Rc<F>> {
        self.functions.shift_remove(name)
    }

    /// Look up a function by name
    pub fn lookup(&self, name: &FunctionName) -> Result<Rc<F>> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| Error::FunctionNotFound {
                kind: self.kind,
                name: name.clone(),
            })
    }

    /// Check if a name is bound
    pub fn contains(&self, name: &FunctionName) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &FunctionName> {
        self.functions.keys()
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl<F: ?Sized> fmt::Debug for FunctionRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("kind", &self.kind)
            .field("names", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The trigger, prereq and action registries of one engine
#[derive(Debug)]
pub struct Functions {
    triggers: FunctionRegistry<PredicateFn>,
    prereqs: FunctionRegistry<PredicateFn>,
    actions: FunctionRegistry<ActionFnBody>,
}

impl Functions {
    /// Name of the built-in trigger that is always true
    pub const ALWAYS: &'static str = "always";

    /// Create the registries, with the `always` trigger pre-registered
    pub fn new() -> Self {
        let mut triggers = FunctionRegistry::new(FunctionKind::Trigger);
        triggers.functions.insert(
            FunctionName::new(Self::ALWAYS),
            predicate(|_, _| true),
        );
        Self {
            triggers,
            prereqs: FunctionRegistry::new(FunctionKind::Prereq),
            actions: FunctionRegistry::new(FunctionKind::Action),
        }
    }

    /// Trigger registry
    pub fn triggers(&self) -> &FunctionRegistry<PredicateFn> {
        &self.triggers
    }

    /// Mutable trigger registry
    pub fn triggers_mut(&mut self) -> &mut FunctionRegistry<PredicateFn> {
        &mut self.triggers
    }

    /// Prereq registry
    pub fn prereqs(&self) -> &FunctionRegistry<PredicateFn> {
        &self.prereqs
    }

    /// Mutable prereq registry
    pub fn prereqs_mut(&mut self) -> &mut FunctionRegistry<PredicateFn> {
        &mut self.prereqs
    }

    /// Action registry
    pub fn actions(&self) -> &FunctionRegistry<ActionFnBody> {
        &self.actions
    }

    /// Mutable action registry
    pub fn actions_mut(&mut self) -> &mut FunctionRegistry<ActionFnBody> {
        &mut self.actions
    }

    /// Predicate registry for triggers or prereqs; `None` for actions
    pub fn predicates(&self, kind: FunctionKind) -> Option<&FunctionRegistry<PredicateFn>> {
        match kind {
            FunctionKind::Trigger => Some(&self.triggers),
            FunctionKind::Prereq => Some(&self.prereqs),
            FunctionKind::Action => None,
        }
    }

    /// Check if `name` is bound in the registry for `kind`
    pub fn contains(&self, kind: FunctionKind, name: &FunctionName) -> bool {
        match kind {
            FunctionKind::Trigger => self.triggers.contains(name),
            FunctionKind::Prereq => self.prereqs.contains(name),
            FunctionKind::Action => self.actions.contains(name),
        }
    }

    /// Fail with `FunctionNotFound` unless `name` is bound for `kind`
    pub fn require(&self, kind: FunctionKind, name: &FunctionName) -> Result<()> {
        if self.contains(kind, name) {
            Ok(())
        } else {
            Err(Error::FunctionNotFound {
                kind,
                name: name.clone(),
            })
        }
    }
}

impl Default for Functions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut functions = Functions::new();
        let hungry = predicate(|_, _| true);
        let handle = functions
            .triggers_mut()
            .register("hungry", hungry.clone())
            .unwrap();

        assert_eq!(handle.kind, FunctionKind::Trigger);
        assert_eq!(handle.name.as_str(), "hungry");
        assert!(functions.contains(FunctionKind::Trigger, &"hungry".into()));
        assert!(!functions.contains(FunctionKind::Prereq, &"hungry".into()));
        assert!(functions.triggers().lookup(&"hungry".into()).is_ok());
    }

    #[test]
    fn test_identical_reregistration_is_noop() {
        let mut functions = Functions::new();
        let eat = action(|_, _| Value::Null);
        functions
            .actions_mut()
            .register("eat", eat.clone())
            .unwrap();
        functions.actions_mut().register("eat", eat).unwrap();
        assert_eq!(functions.actions().len(), 1);
    }

    #[test]
    fn test_conflict() {
        let mut functions = Functions::new();
        functions
            .prereqs_mut()
            .register("awake", predicate(|_, _| true))
            .unwrap();

        let err = functions
            .prereqs_mut()
            .register("awake", predicate(|_, _| true))
            .unwrap_err();
        assert!(err.is_conflict());

        // After unregistering, the name is free again.
        functions.prereqs_mut().unregister(&"awake".into());
        assert!(functions
            .prereqs_mut()
            .register("awake", predicate(|_, _| false))
            .is_ok());
    }

    #[test]
    fn test_lookup_missing() {
        let functions = Functions::new();
        let err = functions.actions().lookup(&"nothing".into()).err().unwrap();
        assert!(err.is_not_found());
        assert!(functions
            .require(FunctionKind::Action, &"nothing".into())
            .is_err());
    }

    #[test]
    fn test_always_builtin() {
        let functions = Functions::new();
        assert!(functions.contains(FunctionKind::Trigger, &Functions::ALWAYS.into()));
        assert_eq!(functions.triggers().names().count(), 1);
    }
}
