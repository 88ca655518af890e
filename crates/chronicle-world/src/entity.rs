//! World entities that follow rulebooks
//!
//! Entities are lightweight handles. Their stats are versioned facts in the
//! engine and their rulebook assignment lives in the engine's store, so a
//! handle can be rebuilt at any time from its ids.

use chronicle_core::Value;
use chronicle_rules::{Engine, FactKey, Result, RuleFollower, RulebookName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a portal's stats relate to the portal going the other way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReplicationPolicy {
    /// The portal keeps its own stats
    #[default]
    Independent,
    /// Stat reads and writes go to the reciprocal portal
    Mirror,
}

fn stored_rulebook(engine: &Engine, id: &str) -> RulebookName {
    engine
        .follower_rulebook(id)
        .unwrap_or_else(|| RulebookName::new(id))
}

/// A whole graph of places and portals
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Character {
    name: String,
}

impl Character {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stat(&self, engine: &Engine, stat: &str) -> Option<Value> {
        engine
            .fact(&FactKey::new(self.follower_id(), stat))
            .cloned()
    }

    pub fn set_stat(&self, engine: &mut Engine, stat: &str, value: impl Into<Value>) {
        engine.set_fact(FactKey::new(self.follower_id(), stat), value);
    }

    pub fn delete_stat(&self, engine: &mut Engine, stat: &str) {
        engine.delete_fact(FactKey::new(self.follower_id(), stat));
    }
}

impl RuleFollower for Character {
    fn follower_id(&self) -> String {
        self.name.clone()
    }

    fn rulebook_name(&self, engine: &Engine) -> Result<RulebookName> {
        Ok(stored_rulebook(engine, &self.follower_id()))
    }

    fn set_rulebook_name(&self, engine: &mut Engine, name: RulebookName) -> Result<()> {
        engine.set_follower_rulebook(&self.follower_id(), &name)
    }
}

/// A node in a character's graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Place {
    character: String,
    name: String,
}

impl Place {
    pub(crate) fn new(character: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            name: name.into(),
        }
    }

    pub fn character(&self) -> &str {
        &self.character
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stat(&self, engine: &Engine, stat: &str) -> Option<Value> {
        engine
            .fact(&FactKey::new(self.follower_id(), stat))
            .cloned()
    }

    pub fn set_stat(&self, engine: &mut Engine, stat: &str, value: impl Into<Value>) {
        engine.set_fact(FactKey::new(self.follower_id(), stat), value);
    }

    pub fn delete_stat(&self, engine: &mut Engine, stat: &str) {
        engine.delete_fact(FactKey::new(self.follower_id(), stat));
    }
}

impl RuleFollower for Place {
    fn follower_id(&self) -> String {
        format!("{}.{}", self.character, self.name)
    }

    fn rulebook_name(&self, engine: &Engine) -> Result<RulebookName> {
        Ok(stored_rulebook(engine, &self.follower_id()))
    }

    fn set_rulebook_name(&self, engine: &mut Engine, name: RulebookName) -> Result<()> {
        engine.set_follower_rulebook(&self.follower_id(), &name)
    }
}

/// A directed edge between two places of one character
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Portal {
    character: String,
    origin: String,
    destination: String,
    policy: ReplicationPolicy,
}

impl Portal {
    pub(crate) fn new(
        character: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
        policy: ReplicationPolicy,
    ) -> Self {
        Self {
            character: character.into(),
            origin: origin.into(),
            destination: destination.into(),
            policy,
        }
    }

    pub fn character(&self) -> &str {
        &self.character
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn policy(&self) -> ReplicationPolicy {
        self.policy
    }

    pub(crate) fn set_policy(&mut self, policy: ReplicationPolicy) {
        self.policy = policy;
    }

    pub(crate) fn reverse_id(&self) -> String {
        portal_id(&self.character, &self.destination, &self.origin)
    }

    /// Entity whose facts hold this portal's stats
    fn stat_owner(&self) -> String {
        match self.policy {
            ReplicationPolicy::Independent => self.follower_id(),
            ReplicationPolicy::Mirror => self.reverse_id(),
        }
    }

    pub fn stat(&self, engine: &Engine, stat: &str) -> Option<Value> {
        engine.fact(&FactKey::new(self.stat_owner(), stat)).cloned()
    }

    /// Set a stat; on a mirror this sets it on the reciprocal
    pub fn set_stat(&self, engine: &mut Engine, stat: &str, value: impl Into<Value>) {
        engine.set_fact(FactKey::new(self.stat_owner(), stat), value);
    }

    pub fn delete_stat(&self, engine: &mut Engine, stat: &str) {
        engine.delete_fact(FactKey::new(self.stat_owner(), stat));
    }
}

pub(crate) fn portal_id(character: &str, origin: &str, destination: &str) -> String {
    format!("{}.{}->{}", character, origin, destination)
}

impl RuleFollower for Portal {
    fn follower_id(&self) -> String {
        portal_id(&self.character, &self.origin, &self.destination)
    }

    fn rulebook_name(&self, engine: &Engine) -> Result<RulebookName> {
        Ok(stored_rulebook(engine, &self.follower_id()))
    }

    fn set_rulebook_name(&self, engine: &mut Engine, name: RulebookName) -> Result<()> {
        engine.set_follower_rulebook(&self.follower_id(), &name)
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.follower_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_rules::{EngineConfig, Rule, RuleName};

    #[test]
    fn test_default_rulebook_names() {
        let engine = Engine::default();
        let place = Place::new("physical", "kitchen");
        let policy = ReplicationPolicy::Independent;
        let portal = Portal::new("physical", "kitchen", "hall", policy);
        assert_eq!(
            Character::new("physical")
                .rulebook_name(&engine)
                .unwrap()
                .as_str(),
            "physical"
        );
        assert_eq!(
            place.rulebook_name(&engine).unwrap().as_str(),
            "physical.kitchen"
        );
        assert_eq!(
            portal.rulebook_name(&engine).unwrap().as_str(),
            "physical.kitchen->hall"
        );
    }

    #[test]
    fn test_mirror_redirects_stats() {
        let mut engine = Engine::default();
        let forward = Portal::new("g", "a", "b", ReplicationPolicy::Independent);
        let back = Portal::new("g", "b", "a", ReplicationPolicy::Mirror);

        forward.set_stat(&mut engine, "distance", 3);
        assert_eq!(back.stat(&engine, "distance"), Some(Value::Int(3)));

        back.set_stat(&mut engine, "distance", 5);
        assert_eq!(forward.stat(&engine, "distance"), Some(Value::Int(5)));

        back.delete_stat(&mut engine, "distance");
        assert_eq!(forward.stat(&engine, "distance"), None);
    }

    #[test]
    fn test_portal_follows_own_rulebook() {
        for caching in [true, false] {
            let mut engine = Engine::new(EngineConfig::default().with_caching(caching));
            let portal = Portal::new("g", "a", "b", ReplicationPolicy::Independent);
            Rule::create(&mut engine, "open").unwrap();
            Rule::create(&mut engine, "close").unwrap();
            let book = portal.rulebook(&engine).unwrap();
            book.append(&mut engine, "open").unwrap();
            book.append(&mut engine, "close").unwrap();
            engine.advance();
            book.set_active(&mut engine, &"close".into(), false)
                .unwrap();

            let local = portal.rule_names_activeness(&engine).unwrap();
            assert_eq!(
                local,
                vec![
                    (RuleName::new("open"), true),
                    (RuleName::new("close"), false),
                ]
            );
            let active: Vec<_> = portal.rules(&engine).unwrap();
            assert_eq!(active, vec![Rule::get(&engine, "open").unwrap()]);
        }
    }
}
