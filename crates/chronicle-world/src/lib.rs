//! Chronicle World - entities that follow rules
//!
//! Concrete rule followers for a graph-shaped world:
//! - [`Character`]: a whole graph
//! - [`Place`]: a node of a character's graph
//! - [`Portal`]: a directed edge between two places
//!
//! Each entity follows a rulebook named after it unless assigned another
//! one, and keeps its stats as versioned facts in the engine. [`World`]
//! holds the topology and drives every entity through its rules once per
//! tick.
//!
//! ## Reciprocal portals
//!
//! A symmetrical portal is created together with its reverse, and the
//! reverse gets [`ReplicationPolicy::Mirror`]. A mirror reads and writes its
//! stats on the portal it was created with; the relationship is fixed when the pair is
//! created.

mod entity;
mod error;
mod world;

pub use entity::{Character, Place, Portal, ReplicationPolicy};
pub use error::{Error, Result};
pub use world::{FiredRule, StepReport, World};
