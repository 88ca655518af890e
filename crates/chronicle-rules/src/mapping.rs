//! RuleMapping - a rulebook viewed by rule name at the current time
//!
//! The mapping only shows rules that are both members of its rulebook and
//! active now. Assigning through it creates, replaces, activates or
//! deactivates rules depending on what is assigned (see `RuleAssignment`).

use crate::function::ActionFn;
use crate::{Engine, Error, Result, Rule, RuleBook, RuleName, RulebookName};
use indexmap::IndexMap;
use std::fmt;

/// What can be assigned to a name in a `RuleMapping`
pub enum RuleAssignment {
    /// Activate or deactivate an existing member
    Active(bool),
    /// Place an existing rule under this name's slot, or append it
    Rule(RuleName),
    /// Create a new single-action rule
    Action(ActionFn),
}

impl From<bool> for RuleAssignment {
    fn from(active: bool) -> Self {
        RuleAssignment::Active(active)
    }
}

impl From<Rule> for RuleAssignment {
    fn from(rule: Rule) -> Self {
        RuleAssignment::Rule(rule.name().clone())
    }
}

impl From<&Rule> for RuleAssignment {
    fn from(rule: &Rule) -> Self {
        RuleAssignment::Rule(rule.name().clone())
    }
}

impl From<RuleName> for RuleAssignment {
    fn from(name: RuleName) -> Self {
        RuleAssignment::Rule(name)
    }
}

impl From<ActionFn> for RuleAssignment {
    fn from(f: ActionFn) -> Self {
        RuleAssignment::Action(f)
    }
}

impl fmt::Debug for RuleAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAssignment::Active(active) => f.debug_tuple("Active").field(active).finish(),
            RuleAssignment::Rule(name) => f.debug_tuple("Rule").field(name).finish(),
            RuleAssignment::Action(_) => f.write_str("Action(..)"),
        }
    }
}

/// Callback told about activation changes; `None` when a rule is removed
pub type MappingListener = Box<dyn FnMut(&RuleName, Option<bool>)>;

/// Live view of one rulebook's active rules
pub struct RuleMapping {
    rulebook: RuleBook,
    handles: IndexMap<RuleName, Rule>,
    listeners: Vec<MappingListener>,
    rule_listeners: IndexMap<RuleName, Vec<MappingListener>>,
}

impl RuleMapping {
    pub fn new(rulebook: impl Into<RulebookName>) -> Self {
        Self {
            rulebook: RuleBook::new(rulebook),
            handles: IndexMap::new(),
            listeners: Vec::new(),
            rule_listeners: IndexMap::new(),
        }
    }

    /// The underlying rulebook
    pub fn rulebook(&self) -> &RuleBook {
        &self.rulebook
    }

    /// Active rule names, in rulebook order
    pub fn names(&self, engine: &Engine) -> Result<Vec<RuleName>> {
        self.rulebook.active_rules(engine)
    }

    pub fn len(&self, engine: &Engine) -> Result<usize> {
        Ok(self.names(engine)?.len())
    }

    pub fn is_empty(&self, engine: &Engine) -> Result<bool> {
        Ok(self.len(engine)? == 0)
    }

    /// True if `name` is a member and active now
    pub fn contains(&self, engine: &Engine, name: &RuleName) -> Result<bool> {
        if !self.rulebook.contains(engine, name) {
            return Ok(false);
        }
        self.rulebook.is_active(engine, name)
    }

    /// Handle to an active rule
    pub fn get(&mut self, engine: &Engine, name: &RuleName) -> Result<Rule> {
        if !self.contains(engine, name)? {
            return Err(Error::RuleInactive {
                rulebook: self.rulebook.name().clone(),
                rule: name.clone(),
            });
        }
        if let Some(rule) = self.handles.get(name) {
            return Ok(rule.clone());
        }
        let rule = Rule::get(engine, name.clone())?;
        self.handles.insert(name.clone(), rule.clone());
        Ok(rule)
    }

    /// Assign to `name`
    ///
    /// * `Active(b)`: activate or deactivate; the rule must already be a member.
    /// * `Rule(r)`: if `name` holds a slot, put `r` there; otherwise append
    ///   and activate `r`.
    /// * `Action(f)`: create a rule called `name` whose only action is `f`,
    ///   append it and activate it. Fails if the rule already exists.
    pub fn set(
        &mut self,
        engine: &mut Engine,
        name: impl Into<RuleName>,
        value: impl Into<RuleAssignment>,
    ) -> Result<()> {
        let name = name.into();
        match value.into() {
            RuleAssignment::Active(active) => {
                if !self.rulebook.contains(engine, &name) {
                    return Err(Error::NotAMember {
                        rulebook: self.rulebook.name().clone(),
                        rule: name,
                    });
                }
                self.activate(engine, &name, active)
            }
            RuleAssignment::Rule(rule) => {
                if !engine.has_rule(&rule) {
                    return Err(Error::RuleNotFound(rule));
                }
                match self.rulebook.index(engine, &name) {
                    Ok(i) => {
                        if rule != name {
                            self.handles.shift_remove(&name);
                            self.rulebook.set(engine, i, rule)?;
                        }
                        Ok(())
                    }
                    Err(_) => self.activate(engine, &rule, true),
                }
            }
            RuleAssignment::Action(f) => {
                if engine.has_rule(&name) {
                    return Err(Error::RuleConflict(name));
                }
                engine
                    .functions()
                    .actions()
                    .check(&name.as_str().into(), &f)?;
                let rule = Rule::create(engine, name.clone())?;
                rule.action(engine, name.as_str(), f)?;
                self.activate(engine, &name, true)
            }
        }
    }

    /// Create a single-action rule, optionally with the `always` trigger
    pub fn define(
        &mut self,
        engine: &mut Engine,
        name: impl Into<RuleName>,
        f: ActionFn,
        always: bool,
    ) -> Result<Rule> {
        let name = name.into();
        self.set(engine, name.clone(), f)?;
        let rule = self.get(engine, &name)?;
        if always {
            rule.always(engine)?;
        }
        Ok(rule)
    }

    /// Remove `name` from the rulebook entirely
    pub fn delete(&mut self, engine: &mut Engine, name: &RuleName) -> Result<()> {
        let i = self.rulebook.index(engine, name)?;
        self.rulebook.delete(engine, i)?;
        self.handles.shift_remove(name);
        self.dispatch(name, None);
        Ok(())
    }

    fn activate(&mut self, engine: &mut Engine, rule: &RuleName, active: bool) -> Result<()> {
        if self.rulebook.contains(engine, rule) {
            self.rulebook.set_active(engine, rule, active)?;
        } else {
            self.rulebook.append(engine, rule.clone())?;
        }
        self.dispatch(rule, Some(active));
        Ok(())
    }

    // === Listeners ===

    /// Call `f` on every activation change or removal
    pub fn listener(&mut self, f: impl FnMut(&RuleName, Option<bool>) + 'static) {
        self.listeners.push(Box::new(f));
    }

    /// Call `f` on activation changes or removal of one rule
    pub fn rule_listener(
        &mut self,
        rule: impl Into<RuleName>,
        f: impl FnMut(&RuleName, Option<bool>) + 'static,
    ) {
        self.rule_listeners
            .entry(rule.into())
            .or_default()
            .push(Box::new(f));
    }

    fn dispatch(&mut self, rule: &RuleName, active: Option<bool>) {
        for listener in self.listeners.iter_mut() {
            listener(rule, active);
        }
        if let Some(listeners) = self.rule_listeners.get_mut(rule) {
            for listener in listeners.iter_mut() {
                listener(rule, active);
            }
        }
    }
}

impl fmt::Debug for RuleMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleMapping")
            .field("rulebook", self.rulebook.name())
            .field("handles", &self.handles.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{action, predicate};
    use crate::FunctionKind;
    use chronicle_core::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_define_creates_and_activates() {
        let mut engine = Engine::default();
        let mut cats = RuleMapping::new("cats");
        let rule = cats
            .define(&mut engine, "feed_cat", action(|_, _| Value::Int(1)), true)
            .unwrap();

        assert!(cats.contains(&engine, &"feed_cat".into()).unwrap());
        assert_eq!(
            cats.names(&engine).unwrap(),
            vec![RuleName::new("feed_cat")]
        );
        assert_eq!(
            rule.evaluate(&mut engine, &[]).unwrap(),
            vec![Value::Int(1)]
        );

        let err = cats
            .define(&mut engine, "feed_cat", action(|_, _| Value::Null), false)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_activate_by_bool() {
        let mut engine = Engine::default();
        let mut mapping = RuleMapping::new("book");
        mapping
            .define(&mut engine, "r", action(|_, _| Value::Null), false)
            .unwrap();

        engine.advance();
        mapping.set(&mut engine, "r", false).unwrap();
        assert!(!mapping.contains(&engine, &"r".into()).unwrap());
        assert!(mapping
            .get(&engine, &"r".into())
            .unwrap_err()
            .is_not_found());
        assert_eq!(mapping.len(&engine).unwrap(), 0);

        // Deactivated rules are still members, so they can be reactivated.
        mapping.set(&mut engine, "r", true).unwrap();
        assert!(mapping.get(&engine, &"r".into()).is_ok());

        let err = mapping.set(&mut engine, "stranger", true).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_assign_rule_replaces_slot() {
        let mut engine = Engine::default();
        let mut mapping = RuleMapping::new("book");
        mapping
            .define(&mut engine, "a", action(|_, _| Value::Null), false)
            .unwrap();
        mapping
            .define(&mut engine, "b", action(|_, _| Value::Null), false)
            .unwrap();
        let c = Rule::create(&mut engine, "c").unwrap();

        mapping.set(&mut engine, "a", &c).unwrap();
        assert_eq!(
            mapping.rulebook().rules(&engine),
            vec![RuleName::new("c"), RuleName::new("b")]
        );

        // A name with no slot appends.
        let d = Rule::create(&mut engine, "d").unwrap();
        mapping.set(&mut engine, "elsewhere", d).unwrap();
        assert_eq!(
            mapping.rulebook().rules(&engine).last(),
            Some(&RuleName::new("d"))
        );

        let err = mapping
            .set(&mut engine, "b", RuleName::new("missing"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_action_assignment_conflict_leaves_no_binding() {
        let mut engine = Engine::default();
        let mut mapping = RuleMapping::new("book");
        engine
            .functions_mut()
            .actions_mut()
            .register("taken", action(|_, _| Value::Null))
            .unwrap();

        let err = mapping
            .set(&mut engine, "taken", action(|_, _| Value::Bool(true)))
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(!engine.has_rule(&"taken".into()));
    }

    #[test]
    fn test_delete_and_listeners() {
        let mut engine = Engine::default();
        let mut mapping = RuleMapping::new("book");
        let events = Rc::new(RefCell::new(Vec::new()));
        let log = events.clone();
        mapping.listener(move |rule, active| {
            log.borrow_mut().push((rule.clone(), active))
        });
        let only_b = Rc::new(RefCell::new(0));
        let count = only_b.clone();
        mapping.rule_listener("b", move |_, _| *count.borrow_mut() += 1);

        mapping
            .define(&mut engine, "a", action(|_, _| Value::Null), false)
            .unwrap();
        mapping
            .define(&mut engine, "b", action(|_, _| Value::Null), false)
            .unwrap();
        mapping.set(&mut engine, "a", false).unwrap();
        mapping.delete(&mut engine, &"b".into()).unwrap();

        assert_eq!(
            *events.borrow(),
            vec![
                (RuleName::new("a"), Some(true)),
                (RuleName::new("b"), Some(true)),
                (RuleName::new("a"), Some(false)),
                (RuleName::new("b"), None),
            ]
        );
        assert_eq!(*only_b.borrow(), 2);
        assert!(!mapping.rulebook().contains(&engine, &"b".into()));
        assert!(engine.has_rule(&"b".into()));
        assert!(mapping.delete(&mut engine, &"b".into()).is_err());
    }

    #[test]
    fn test_define_with_triggers_added_later() {
        let mut engine = Engine::default();
        let mut mapping = RuleMapping::new("book");
        let rule = mapping
            .define(&mut engine, "r", action(|_, _| Value::Null), false)
            .unwrap();
        assert_eq!(rule.fire(&mut engine, &[]).unwrap(), None);

        rule.trigger(&mut engine, "yes", predicate(|_, _| true))
            .unwrap();
        assert_eq!(
            rule.functions(&engine, FunctionKind::Action).unwrap().len(),
            1
        );
        assert_eq!(
            rule.fire(&mut engine, &[]).unwrap(),
            Some(vec![Value::Null])
        );
    }
}
