//! Error types for chronicle-rules

use crate::{FunctionKind, FunctionName, RuleName, RulebookName};
use thiserror::Error;

/// Result type for chronicle-rules operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in chronicle-rules
///
/// Every fallible operation checks before it writes, so an error always
/// leaves the engine, its store and its registries as they were.
#[derive(Debug, Error)]
pub enum Error {
    /// No rule with this name exists
    #[error("no such rule: {0}")]
    RuleNotFound(RuleName),

    /// A rule with this name already exists
    #[error("already have a rule named {0}")]
    RuleConflict(RuleName),

    /// No function of this kind is registered under the name
    #[error("no {kind} function named {name}")]
    FunctionNotFound {
        kind: FunctionKind,
        name: FunctionName,
    },

    /// The name is already bound to a different function body
    #[error("already have a {kind} function named {name}; unregister it first to replace it")]
    FunctionConflict {
        kind: FunctionKind,
        name: FunctionName,
    },

    /// The rule is not listed in the rulebook
    #[error("no rule named {rule} in rulebook {rulebook}")]
    NotInRulebook {
        rulebook: RulebookName,
        rule: RuleName,
    },

    /// Activation was requested for a rule that is not a rulebook member
    #[error("can't activate or deactivate {rule}, because it is not in rulebook {rulebook}")]
    NotAMember {
        rulebook: RulebookName,
        rule: RuleName,
    },

    /// The rule is a member but not active at the current time
    #[error("rule {rule} is not in effect in rulebook {rulebook}")]
    RuleInactive {
        rulebook: RulebookName,
        rule: RuleName,
    },

    /// Positional access past the end of a list
    #[error("index {index} out of range for {what} of length {len}")]
    IndexOutOfRange {
        what: String,
        index: usize,
        len: usize,
    },

    /// The follower has no rulebook assigned
    #[error("no rulebook assigned to {0}")]
    RulebookUnassigned(String),

    /// The store collaborator failed
    #[error("store error: {0}")]
    Store(String),

    /// RON encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] chronicle_core::Error),
}

impl Error {
    /// True for the "absent" family of errors
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::RuleNotFound(_)
            | Error::FunctionNotFound { .. }
            | Error::NotInRulebook { .. }
            | Error::RuleInactive { .. }
            | Error::RulebookUnassigned(_) => true,
            Error::Core(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// True when a name collided with an existing, different definition
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::RuleConflict(_)
            | Error::FunctionConflict { .. }
            | Error::NotAMember { .. } => true,
            Error::Core(e) => e.is_conflict(),
            _ => false,
        }
    }

    pub(crate) fn out_of_range(what: impl Into<String>, index: usize, len: usize) -> Self {
        Error::IndexOutOfRange {
            what: what.into(),
            index,
            len,
        }
    }
}

impl From<ron::error::SpannedError> for Error {
    fn from(err: ron::error::SpannedError) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<ron::Error> for Error {
    fn from(err: ron::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

// Compile-time check that Error is Send + Sync for thread-safe error propagation.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
