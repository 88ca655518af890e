//! Name types for rules, rulebooks, behavior functions and facts
//!
//! All three are plain strings on the wire; the newtypes keep them from being
//! mixed up in signatures.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new name
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// Get the name as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&$name> for $name {
            fn from(name: &$name) -> Self {
                name.clone()
            }
        }
    };
}

name_type!(
    /// Globally unique name of a rule
    RuleName
);

name_type!(
    /// Name of a shared rulebook
    RulebookName
);

name_type!(
    /// Name a trigger, prereq or action function is registered under
    FunctionName
);

/// Address of one versioned world fact: an entity's stat
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactKey {
    pub entity: String,
    pub stat: String,
}

impl FactKey {
    /// Create a new fact key
    pub fn new(entity: impl Into<String>, stat: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            stat: stat.into(),
        }
    }
}

impl fmt::Display for FactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.entity, self.stat)
    }
}
