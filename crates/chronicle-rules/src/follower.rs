//! RuleFollower - the capability of world entities that follow a rulebook

use crate::{Engine, Result, Rule, RuleBook, RuleMapping, RuleName, RulebookName};
use chronicle_core::Value;

/// Rules that fired for one follower, with their action results
pub type FiredRules = Vec<(RuleName, Vec<Value>)>;

/// Something that owns a reference to exactly one rulebook
///
/// Implementors decide where the rulebook name is persisted. Everything else
/// is derived from it.
pub trait RuleFollower {
    /// Stable identity used in logs and listener callbacks
    fn follower_id(&self) -> String;

    /// Name of the rulebook this follower uses
    fn rulebook_name(&self, engine: &Engine) -> Result<RulebookName>;

    /// Persist a new rulebook name
    fn set_rulebook_name(&self, engine: &mut Engine, name: RulebookName) -> Result<()>;

    /// Arguments passed to every trigger, prereq and action
    fn follower_args(&self) -> Vec<Value> {
        vec![Value::String(self.follower_id())]
    }

    fn rulebook(&self, engine: &Engine) -> Result<RuleBook> {
        Ok(RuleBook::new(self.rulebook_name(engine)?))
    }

    /// A fresh mapping over the current rulebook
    fn rule_mapping(&self, engine: &Engine) -> Result<RuleMapping> {
        Ok(RuleMapping::new(self.rulebook_name(engine)?))
    }

    /// Every rulebook member with its activeness at the current time
    fn rule_names_activeness(&self, engine: &Engine) -> Result<Vec<(RuleName, bool)>> {
        self.rulebook(engine)?.names_activeness(engine)
    }

    /// Rules active at the current time, in rulebook order
    fn rules(&self, engine: &Engine) -> Result<Vec<Rule>> {
        let active = self.rule_names_activeness(engine)?;
        active
            .into_iter()
            .filter(|(_, active)| *active)
            .map(|(name, _)| Rule::get(engine, name))
            .collect()
    }

    /// Switch to another rulebook and tell the engine's follower listeners
    ///
    /// Mappings obtained before the switch still point at the old rulebook.
    fn assign_rulebook(&self, engine: &mut Engine, name: impl Into<RulebookName>) -> Result<()>
    where
        Self: Sized,
    {
        let name = name.into();
        self.set_rulebook_name(engine, name.clone())?;
        let id = self.follower_id();
        tracing::debug!(follower = %id, rulebook = %name, "assigned rulebook");
        engine.dispatch_follower(&id, &name);
        Ok(())
    }

    /// Evaluate every active rule in rulebook order
    fn follow_rules(&self, engine: &mut Engine) -> Result<FiredRules> {
        let args = self.follower_args();
        let mut fired = Vec::new();
        for rule in self.rules(engine)? {
            if let Some(results) = rule.fire(engine, &args)? {
                fired.push((rule.name().clone(), results));
            }
        }
        Ok(fired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{action, predicate};
    use crate::{Error, FactKey};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Follower that keeps its rulebook name in the store
    struct Cat(&'static str);

    impl RuleFollower for Cat {
        fn follower_id(&self) -> String {
            self.0.to_string()
        }

        fn rulebook_name(&self, engine: &Engine) -> Result<RulebookName> {
            engine
                .follower_rulebook(self.0)
                .ok_or_else(|| Error::RulebookUnassigned(self.0.to_string()))
        }

        fn set_rulebook_name(&self, engine: &mut Engine, name: RulebookName) -> Result<()> {
            engine.set_follower_rulebook(self.0, &name)
        }
    }

    fn setup_feed_cat(engine: &mut Engine) {
        let rule = Rule::create(engine, "feed_cat").unwrap();
        rule.trigger(engine, "always_true", predicate(|_, _| true))
            .unwrap();
        rule.action(
            engine,
            "decrement_hunger",
            action(|engine, args| {
                let who = args
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let key = FactKey::new(who, "hunger");
                let hunger = engine.fact(&key).and_then(|v| v.as_int()).unwrap_or(10);
                engine.set_fact(key, hunger - 1);
                Value::Int(hunger - 1)
            }),
        )
        .unwrap();
    }

    #[test]
    fn test_shared_rulebook() {
        let mut engine = Engine::default();
        setup_feed_cat(&mut engine);
        let tom = Cat("tom");
        let felix = Cat("felix");
        tom.assign_rulebook(&mut engine, "cats").unwrap();
        felix.assign_rulebook(&mut engine, "cats").unwrap();

        tom.rulebook(&engine)
            .unwrap()
            .append(&mut engine, "feed_cat")
            .unwrap();

        for cat in [&tom, &felix] {
            let mapping = cat.rule_mapping(&engine).unwrap();
            assert!(mapping.contains(&engine, &"feed_cat".into()).unwrap());
            assert_eq!(
                cat.rule_names_activeness(&engine).unwrap(),
                vec![(RuleName::new("feed_cat"), true)]
            );
        }
    }

    #[test]
    fn test_follow_rules() {
        let mut engine = Engine::default();
        setup_feed_cat(&mut engine);
        let tom = Cat("tom");
        tom.assign_rulebook(&mut engine, "cats").unwrap();
        tom.rulebook(&engine)
            .unwrap()
            .append(&mut engine, "feed_cat")
            .unwrap();

        let fired = tom.follow_rules(&mut engine).unwrap();
        assert_eq!(
            fired,
            vec![(RuleName::new("feed_cat"), vec![Value::Int(9)])]
        );
        assert_eq!(
            engine.fact(&FactKey::new("tom", "hunger")),
            Some(&Value::Int(9))
        );
    }

    #[test]
    fn test_unassigned() {
        let engine = Engine::default();
        let err = Cat("stray").rules(&engine).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_assign_notifies() {
        let mut engine = Engine::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        engine.follower_listener(move |who, book| {
            log.borrow_mut().push(format!("{who}:{book}"))
        });

        let tom = Cat("tom");
        tom.assign_rulebook(&mut engine, "cats").unwrap();
        tom.assign_rulebook(&mut engine, "kittens").unwrap();
        assert_eq!(*seen.borrow(), vec!["tom:cats", "tom:kittens"]);
        assert_eq!(
            tom.rulebook_name(&engine).unwrap(),
            RulebookName::new("kittens")
        );
    }
}
