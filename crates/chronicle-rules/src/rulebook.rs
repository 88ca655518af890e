//! Rulebooks: shared, ordered lists of rules with versioned activation
//!
//! Membership and activeness are separate facts. A rule can sit in a
//! rulebook while inactive at the current time; placing it with `set`,
//! `insert` or `append` activates it from the current time onward.

use crate::{Engine, Error, Result, Rule, RuleName, RulebookName};
use chronicle_core::TimeCoordinate;

/// Handle to a named rulebook
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleBook {
    name: RulebookName,
}

impl RuleBook {
    pub fn new(name: impl Into<RulebookName>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &RulebookName {
        &self.name
    }

    /// Number of slots, placeholders included
    pub fn len(&self, engine: &Engine) -> usize {
        engine.reader().rulebook_rules(&self.name).len()
    }

    pub fn is_empty(&self, engine: &Engine) -> bool {
        self.len(engine) == 0
    }

    /// Rule at slot `i`; `None` for a placeholder
    pub fn get(&self, engine: &Engine, i: usize) -> Result<Option<Rule>> {
        let slots = engine.reader().rulebook_rules(&self.name);
        let len = slots.len();
        match slots.into_iter().nth(i) {
            Some(slot) => slot.map(|name| Rule::get(engine, name)).transpose(),
            None => {
                let what = format!("rulebook {}", self.name);
                Err(Error::out_of_range(what, i, len))
            }
        }
    }

    /// Member rules in order, placeholders skipped
    pub fn rules(&self, engine: &Engine) -> Vec<RuleName> {
        engine
            .reader()
            .rulebook_rules(&self.name)
            .into_iter()
            .flatten()
            .collect()
    }

    /// Number of member rules
    pub fn count_rules(&self, engine: &Engine) -> usize {
        engine.reader().count_rulebook_rules(&self.name)
    }

    pub fn contains(&self, engine: &Engine, rule: &RuleName) -> bool {
        self.index(engine, rule).is_ok()
    }

    /// Position of the first slot holding `rule`
    pub fn index(&self, engine: &Engine, rule: &RuleName) -> Result<usize> {
        engine
            .reader()
            .rulebook_rules(&self.name)
            .iter()
            .position(|slot| slot.as_ref() == Some(rule))
            .ok_or_else(|| Error::NotInRulebook {
                rulebook: self.name.clone(),
                rule: rule.clone(),
            })
    }

    /// Put an existing rule at slot `i` and activate it now
    ///
    /// Slots past the end are padded with placeholders.
    pub fn set(&self, engine: &mut Engine, i: usize, rule: impl Into<RuleName>) -> Result<()> {
        let rule = rule.into();
        if !engine.has_rule(&rule) {
            return Err(Error::RuleNotFound(rule));
        }
        let now = engine.time().clone();
        engine.write(|store| {
            store.rulebook_set(&self.name, i, &rule)?;
            store.set_rule_activeness(&self.name, &rule, &now.branch, now.tick, true)
        })?;
        tracing::debug!(
            rulebook = %self.name,
            rule = %rule,
            index = i,
            at = %now,
            "set rulebook slot"
        );
        engine.dispatch_rulebook(self);
        Ok(())
    }

    /// Insert an existing rule at `i`, shifting later slots down
    pub fn insert(&self, engine: &mut Engine, i: usize, rule: impl Into<RuleName>) -> Result<()> {
        let rule = rule.into();
        if !engine.has_rule(&rule) {
            return Err(Error::RuleNotFound(rule));
        }
        engine.write(|store| store.rulebook_decr(&self.name, i))?;
        self.set(engine, i, rule)
    }

    /// Append an existing rule
    pub fn append(&self, engine: &mut Engine, rule: impl Into<RuleName>) -> Result<()> {
        let i = self.len(engine);
        self.set(engine, i, rule)
    }

    /// Remove slot `i`; activation history is kept
    pub fn delete(&self, engine: &mut Engine, i: usize) -> Result<()> {
        engine.write(|store| store.rulebook_del(&self.name, i))?;
        tracing::debug!(rulebook = %self.name, index = i, "deleted rulebook slot");
        engine.dispatch_rulebook(self);
        Ok(())
    }

    // === Activation ===

    /// Whether `rule` is active here at `at`; never-activated rules are inactive
    pub fn is_active_at(
        &self,
        engine: &Engine,
        rule: &RuleName,
        at: &TimeCoordinate,
    ) -> Result<bool> {
        engine
            .reader()
            .active_rule_rulebook(engine.branches(), &self.name, rule, &at.branch, at.tick)
    }

    /// Whether `rule` is active here at the current time
    pub fn is_active(&self, engine: &Engine, rule: &RuleName) -> Result<bool> {
        self.is_active_at(engine, rule, engine.time())
    }

    /// Activate or deactivate a member from the current time onward
    pub fn set_active(&self, engine: &mut Engine, rule: &RuleName, active: bool) -> Result<()> {
        if !self.contains(engine, rule) {
            return Err(Error::NotAMember {
                rulebook: self.name.clone(),
                rule: rule.clone(),
            });
        }
        let now = engine.time().clone();
        engine.write(|store| {
            store.set_rule_activeness(&self.name, rule, &now.branch, now.tick, active)
        })?;
        tracing::debug!(
            rulebook = %self.name,
            rule = %rule,
            active,
            at = %now,
            "set rule activeness"
        );
        Ok(())
    }

    /// Members active at the current time, in order
    pub fn active_rules(&self, engine: &Engine) -> Result<Vec<RuleName>> {
        let now = engine.time();
        engine
            .reader()
            .active_rules_rulebook(engine.branches(), &self.name, &now.branch, now.tick)
    }

    /// Every member with its activeness at the current time
    pub fn names_activeness(&self, engine: &Engine) -> Result<Vec<(RuleName, bool)>> {
        let mut out: Vec<(RuleName, bool)> = Vec::new();
        for rule in self.rules(engine) {
            if out.iter().any(|(seen, _)| *seen == rule) {
                continue;
            }
            let active = self.is_active(engine, &rule)?;
            out.push((rule, active));
        }
        Ok(out)
    }
}
