//! World - the set of rule-following entities and the step driver
//!
//! A step advances the engine one tick and lets every entity follow its
//! rules: characters first, then places, then portals, each in the order they
//! were added.

use crate::entity::{portal_id, Character, Place, Portal, ReplicationPolicy};
use crate::{Error, Result};
use chronicle_core::{Tick, Value};
use chronicle_rules::{Engine, RuleFollower, RuleName};
use indexmap::IndexMap;

/// One rule that fired during a step
#[derive(Debug, Clone, PartialEq)]
pub struct FiredRule {
    pub follower: String,
    pub rule: RuleName,
    pub results: Vec<Value>,
}

/// Everything that happened in one step
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepReport {
    pub tick: Tick,
    pub fired: Vec<FiredRule>,
}

impl StepReport {
    /// Rules fired by one follower, in order
    pub fn fired_by<'a>(&'a self, follower: &'a str) -> impl Iterator<Item = &'a FiredRule> {
        self.fired.iter().filter(move |f| f.follower == follower)
    }
}

/// Characters with their places and portals
#[derive(Debug, Clone, Default)]
pub struct World {
    characters: IndexMap<String, Character>,
    places: IndexMap<String, Place>,
    portals: IndexMap<String, Portal>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    // === Characters ===

    pub fn add_character(&mut self, name: impl Into<String>) -> Result<Character> {
        let name = name.into();
        if self.characters.contains_key(&name) {
            return Err(Error::EntityConflict(name));
        }
        let character = Character::new(name.clone());
        self.characters.insert(name, character.clone());
        tracing::debug!(character = %character.name(), "added character");
        Ok(character)
    }

    pub fn character(&self, name: &str) -> Result<Character> {
        self.characters
            .get(name)
            .cloned()
            .ok_or_else(|| Error::EntityNotFound(name.to_string()))
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    // === Places ===

    pub fn add_place(&mut self, character: &str, name: impl Into<String>) -> Result<Place> {
        self.character(character)?;
        let place = Place::new(character, name);
        let id = place.follower_id();
        if self.places.contains_key(&id) {
            return Err(Error::EntityConflict(id));
        }
        self.places.insert(id, place.clone());
        Ok(place)
    }

    pub fn place(&self, character: &str, name: &str) -> Result<Place> {
        let id = format!("{}.{}", character, name);
        self.places
            .get(&id)
            .cloned()
            .ok_or(Error::EntityNotFound(id))
    }

    /// Places of one character, in creation order
    pub fn places<'a>(&'a self, character: &'a str) -> impl Iterator<Item = &'a Place> {
        self.places
            .values()
            .filter(move |p| p.character() == character)
    }

    // === Portals ===

    /// Connect two places
    ///
    /// A symmetrical portal also creates the reverse portal as a mirror of
    /// this one. The reverse portal must not exist yet.
    pub fn add_portal(
        &mut self,
        character: &str,
        origin: &str,
        destination: &str,
        symmetrical: bool,
    ) -> Result<Portal> {
        self.place(character, origin)?;
        self.place(character, destination)?;
        let id = portal_id(character, origin, destination);
        if self.portals.contains_key(&id) {
            return Err(Error::EntityConflict(id));
        }
        let policy = ReplicationPolicy::Independent;
        let portal = Portal::new(character, origin, destination, policy);
        if symmetrical {
            let reverse_id = portal.reverse_id();
            if self.portals.contains_key(&reverse_id) {
                return Err(Error::EntityConflict(reverse_id));
            }
            self.portals.insert(id, portal.clone());
            let mirror = Portal::new(character, destination, origin, ReplicationPolicy::Mirror);
            self.portals.insert(reverse_id, mirror);
        } else {
            self.portals.insert(id, portal.clone());
        }
        tracing::debug!(portal = %portal, symmetrical, "added portal");
        Ok(portal)
    }

    pub fn portal(&self, character: &str, origin: &str, destination: &str) -> Result<Portal> {
        let id = portal_id(character, origin, destination);
        self.portals
            .get(&id)
            .cloned()
            .ok_or(Error::EntityNotFound(id))
    }

    /// The portal going the other way
    pub fn reciprocal(&self, portal: &Portal) -> Result<Portal> {
        self.portals
            .get(&portal.reverse_id())
            .cloned()
            .ok_or_else(|| Error::NoReciprocal(portal.follower_id()))
    }

    /// Make a portal symmetrical, or stop it being so
    ///
    /// Turning symmetry on creates the reverse portal if needed and makes it
    /// a mirror. Turning it off makes whichever side was the mirror keep its
    /// own stats again; stats written through the mirror stay with the other
    /// side.
    pub fn set_symmetrical(
        &mut self,
        character: &str,
        origin: &str,
        destination: &str,
        symmetrical: bool,
    ) -> Result<()> {
        let portal = self.portal(character, origin, destination)?;
        let reverse_id = portal.reverse_id();
        match (symmetrical, portal.policy()) {
            (true, ReplicationPolicy::Mirror) => {}
            (true, ReplicationPolicy::Independent) => {
                let policy = ReplicationPolicy::Mirror;
                self.portals
                    .entry(reverse_id)
                    .or_insert_with(|| Portal::new(character, destination, origin, policy))
                    .set_policy(policy);
            }
            (false, ReplicationPolicy::Mirror) => {
                if let Some(own) = self.portals.get_mut(&portal.follower_id()) {
                    own.set_policy(ReplicationPolicy::Independent);
                }
            }
            (false, ReplicationPolicy::Independent) => {
                if let Some(reverse) = self.portals.get_mut(&reverse_id) {
                    reverse.set_policy(ReplicationPolicy::Independent);
                }
            }
        }
        tracing::debug!(portal = %portal, symmetrical, "changed portal symmetry");
        Ok(())
    }

    /// Remove a portal
    ///
    /// A reverse portal that mirrored this one keeps its own stats from now on.
    pub fn remove_portal(
        &mut self,
        character: &str,
        origin: &str,
        destination: &str,
    ) -> Result<Portal> {
        let id = portal_id(character, origin, destination);
        let portal = self
            .portals
            .shift_remove(&id)
            .ok_or(Error::EntityNotFound(id))?;
        if let Some(reverse) = self.portals.get_mut(&portal.reverse_id()) {
            if reverse.policy() == ReplicationPolicy::Mirror {
                reverse.set_policy(ReplicationPolicy::Independent);
            }
        }
        tracing::debug!(portal = %portal, "removed portal");
        Ok(portal)
    }

    /// Portals of one character, in creation order
    pub fn portals<'a>(&'a self, character: &'a str) -> impl Iterator<Item = &'a Portal> {
        self.portals
            .values()
            .filter(move |p| p.character() == character)
    }

    // === Driving ===

    /// Every entity in step order
    pub fn followers(&self) -> Vec<&dyn RuleFollower> {
        let characters = self.characters.values().map(|c| c as &dyn RuleFollower);
        let places = self.places.values().map(|p| p as &dyn RuleFollower);
        let portals = self.portals.values().map(|p| p as &dyn RuleFollower);
        characters.chain(places).chain(portals).collect()
    }

    /// Let every entity follow its rules at the current time
    pub fn follow_all(&self, engine: &mut Engine) -> Result<StepReport> {
        let mut report = StepReport {
            tick: engine.time().tick,
            fired: Vec::new(),
        };
        for follower in self.followers() {
            let id = follower.follower_id();
            for (rule, results) in follower.follow_rules(engine)? {
                report.fired.push(FiredRule {
                    follower: id.clone(),
                    rule,
                    results,
                });
            }
        }
        tracing::debug!(at = %engine.time(), fired = report.fired.len(), "followed rules");
        Ok(report)
    }

    /// Advance one tick, then let every entity follow its rules
    pub fn step(&self, engine: &mut Engine) -> Result<StepReport> {
        engine.advance();
        self.follow_all(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_rules::{action, predicate, FactKey, Rule};

    fn house() -> World {
        let mut world = World::new();
        world.add_character("physical").unwrap();
        for place in ["kitchen", "hall", "garden"] {
            world.add_place("physical", place).unwrap();
        }
        world
    }

    #[test]
    fn test_topology() {
        let mut world = house();
        assert!(world.add_character("physical").unwrap_err().is_conflict());
        assert!(world
            .add_place("nobody", "void")
            .unwrap_err()
            .is_not_found());
        assert!(world
            .add_place("physical", "kitchen")
            .unwrap_err()
            .is_conflict());

        world
            .add_portal("physical", "kitchen", "hall", false)
            .unwrap();
        assert!(world
            .add_portal("physical", "kitchen", "attic", false)
            .unwrap_err()
            .is_not_found());
        assert_eq!(world.places("physical").count(), 3);
        assert_eq!(world.portals("physical").count(), 1);
    }

    #[test]
    fn test_symmetrical_portal() {
        let mut world = house();
        let mut engine = Engine::default();
        let forward = world
            .add_portal("physical", "kitchen", "hall", true)
            .unwrap();
        let back = world.reciprocal(&forward).unwrap();
        assert_eq!(back.policy(), ReplicationPolicy::Mirror);
        assert_eq!(world.reciprocal(&back).unwrap(), forward);

        back.set_stat(&mut engine, "locked", true);
        assert_eq!(forward.stat(&engine, "locked"), Some(Value::Bool(true)));

        let lone = world
            .add_portal("physical", "hall", "garden", false)
            .unwrap();
        assert!(world.reciprocal(&lone).unwrap_err().is_not_found());
        assert!(world
            .add_portal("physical", "garden", "hall", true)
            .unwrap_err()
            .is_conflict());
    }

    #[test]
    fn test_toggle_symmetry() {
        let mut world = house();
        let mut engine = Engine::default();
        let forward = world
            .add_portal("physical", "kitchen", "hall", false)
            .unwrap();
        assert!(world.reciprocal(&forward).is_err());

        world
            .set_symmetrical("physical", "kitchen", "hall", true)
            .unwrap();
        let back = world.reciprocal(&forward).unwrap();
        assert_eq!(back.policy(), ReplicationPolicy::Mirror);
        back.set_stat(&mut engine, "width", 2);
        assert_eq!(forward.stat(&engine, "width"), Some(Value::Int(2)));

        // Asking the mirror side changes nothing.
        world
            .set_symmetrical("physical", "hall", "kitchen", true)
            .unwrap();
        assert_eq!(
            world.reciprocal(&forward).unwrap().policy(),
            ReplicationPolicy::Mirror
        );

        world
            .set_symmetrical("physical", "kitchen", "hall", false)
            .unwrap();
        let back = world.reciprocal(&forward).unwrap();
        assert_eq!(back.policy(), ReplicationPolicy::Independent);
        assert_eq!(back.stat(&engine, "width"), None);
        assert_eq!(forward.stat(&engine, "width"), Some(Value::Int(2)));

        assert!(world
            .set_symmetrical("physical", "hall", "garden", true)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_remove_portal() {
        let mut world = house();
        let forward = world
            .add_portal("physical", "kitchen", "hall", true)
            .unwrap();
        let removed = world.remove_portal("physical", "kitchen", "hall").unwrap();
        assert_eq!(removed, forward);
        assert!(world
            .portal("physical", "kitchen", "hall")
            .unwrap_err()
            .is_not_found());

        let back = world.portal("physical", "hall", "kitchen").unwrap();
        assert_eq!(back.policy(), ReplicationPolicy::Independent);
        assert_eq!(world.portals("physical").count(), 1);
        assert!(world
            .remove_portal("physical", "kitchen", "hall")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_shared_cats_rulebook() {
        let mut world = World::new();
        let mut engine = Engine::default();
        world.add_character("physical").unwrap();
        let tom = world.add_place("physical", "tom").unwrap();
        let felix = world.add_place("physical", "felix").unwrap();
        tom.assign_rulebook(&mut engine, "cats").unwrap();
        felix.assign_rulebook(&mut engine, "cats").unwrap();

        let feed = Rule::create(&mut engine, "feed_cat").unwrap();
        feed.trigger(&mut engine, "always_true", predicate(|_, _| true))
            .unwrap();
        feed.action(
            &mut engine,
            "decrement_hunger",
            action(|engine, args| {
                let who = args
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let key = FactKey::new(who, "hunger");
                let hunger = engine.fact(&key).and_then(Value::as_int).unwrap_or(0);
                engine.set_fact(key, hunger - 1);
                Value::Int(hunger - 1)
            }),
        )
        .unwrap();
        tom.rulebook(&engine)
            .unwrap()
            .append(&mut engine, "feed_cat")
            .unwrap();

        for cat in [&tom, &felix] {
            assert!(cat
                .rule_mapping(&engine)
                .unwrap()
                .contains(&engine, &"feed_cat".into())
                .unwrap());
            assert_eq!(
                cat.rule_names_activeness(&engine).unwrap(),
                vec![(RuleName::new("feed_cat"), true)]
            );
        }

        tom.set_stat(&mut engine, "hunger", 5);
        felix.set_stat(&mut engine, "hunger", 2);
        let report = world.step(&mut engine).unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.fired.len(), 2);
        assert_eq!(report.fired_by("physical.tom").count(), 1);
        assert_eq!(tom.stat(&engine, "hunger"), Some(Value::Int(4)));
        assert_eq!(felix.stat(&engine, "hunger"), Some(Value::Int(1)));

        // History is kept: tick 0 still has the old values.
        engine.set_tick(0);
        assert_eq!(tom.stat(&engine, "hunger"), Some(Value::Int(5)));
    }

    #[test]
    fn test_step_order() {
        let mut world = house();
        let mut engine = Engine::default();
        world
            .add_portal("physical", "kitchen", "hall", false)
            .unwrap();

        let mut mapping = world
            .character("physical")
            .unwrap()
            .rule_mapping(&engine)
            .unwrap();
        mapping
            .define(
                &mut engine,
                "report",
                action(|_, args| args[0].clone()),
                true,
            )
            .unwrap();
        for follower in world.followers() {
            follower
                .set_rulebook_name(&mut engine, "physical".into())
                .unwrap();
        }

        let report = world.step(&mut engine).unwrap();
        let order: Vec<_> = report.fired.iter().map(|f| f.follower.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "physical",
                "physical.kitchen",
                "physical.hall",
                "physical.garden",
                "physical.kitchen->hall",
            ]
        );
        assert_eq!(report.fired[0].results, vec![Value::from("physical")]);
    }
}
