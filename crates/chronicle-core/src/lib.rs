//! Chronicle Core - Branching time and versioned facts
//!
//! This crate provides the storage primitives the rule engine is built on:
//! - Branch/tick coordinates (`TimeCoordinate`, `BranchId`, `Tick`)
//! - Branch ancestry (`BranchTree`), where forking copies nothing
//! - Versioned key/value storage (`VersionedCache`) that resolves reads
//!   through ancestor branches and honours tombstones
//! - Dynamic values (`Value`, `ValueMap`) for facts and rule arguments
//!
//! ## Resolution rule
//!
//! A read at (branch, tick) takes the latest entry at or before `tick` on
//! `branch`. If there is none, the search continues on the parent branch as
//! of the tick the branch was forked at, and so on up to a root. A tombstone
//! ends the search with "deleted"; running out of ancestors is `NotFound`.

mod error;
pub mod time;
mod value;
pub mod versioned;

pub use error::{Error, Result};
pub use time::{BranchId, BranchOrigin, BranchTree, Lineage, Tick, TimeCoordinate};
pub use value::{Value, ValueMap};
pub use versioned::{Lookup, Slot, VersionedCache};
