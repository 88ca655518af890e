//! Chronicle Rules - data-driven rules over branching time
//!
//! Behavior is attached to the world as named rules. Each rule is three
//! ordered lists of function names (triggers, prereqs, actions), and each
//! world entity follows one shared rulebook of rules.
//!
//! ## Architecture
//!
//! ```text
//! Engine (execution context)
//!  │
//!  ├── TimeCoordinate + BranchTree   ← where reads and writes resolve
//!  ├── Functions                     ← trigger / prereq / action registries
//!  ├── RuleStore (trait)             ← rules, rulebooks, activeness
//!  │    └── MemoryStore mirror       ← present while caching
//!  └── result caches, versioned facts, listeners
//!
//! Rule, RuleBook, RuleMapping        ← name handles, operate on &mut Engine
//! RuleFollower (trait)               ← implemented by world entities
//! ```
//!
//! ## Key Components
//!
//! - [`Engine`]: Owns all state; every operation is threaded through it
//! - [`Rule`]: Evaluates triggers, prereqs and actions with short-circuiting
//! - [`RuleBook`]: Ordered rule list with activation versioned by branch and tick
//! - [`RuleMapping`]: Name-keyed view of a rulebook's active rules
//! - [`RuleFollower`]: Capability of anything that follows a rulebook
//! - [`RuleStore`]: Persistent-store collaborator, with [`MemoryStore`]
//!
//! ## Example
//!
//! ```
//! use chronicle_rules::{action, Engine, RuleMapping};
//! use chronicle_core::Value;
//!
//! let mut engine = Engine::default();
//! let mut cats = RuleMapping::new("cats");
//! let feed = cats
//!     .define(&mut engine, "feed_cat", action(|_, _| Value::from("fed")), true)
//!     .unwrap();
//! assert_eq!(feed.evaluate(&mut engine, &[]).unwrap(), vec![Value::from("fed")]);
//! ```

mod config;
mod engine;
mod error;
mod follower;
pub mod function;
mod mapping;
mod names;
mod rule;
mod rulebook;
pub mod store;

pub use config::{EngineConfig, ResultCachePolicy};
pub use engine::{Engine, FollowerListener, RulebookListener};
pub use error::{Error, Result};
pub use follower::{FiredRules, RuleFollower};
pub use function::{
    action, predicate, ActionFn, FunctionHandle, FunctionKind, FunctionRegistry, Functions,
    Predicate,
};
pub use mapping::{MappingListener, RuleAssignment, RuleMapping};
pub use names::{FactKey, FunctionName, RuleName, RulebookName};
pub use rule::{ResultCache, ResultKey, Rule, RuleResults};
pub use rulebook::RuleBook;
pub use store::{ActivenessRecord, MemoryStore, RuleLists, RuleStore};

#[cfg(test)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
