//! Error types for chronicle-world

use thiserror::Error;

/// Result type for chronicle-world operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in chronicle-world
#[derive(Debug, Error)]
pub enum Error {
    /// No entity with this id exists
    #[error("no such entity: {0}")]
    EntityNotFound(String),

    /// An entity with this id already exists
    #[error("entity already exists: {0}")]
    EntityConflict(String),

    /// The portal has no portal going the other way
    #[error("portal {0} has no reciprocal")]
    NoReciprocal(String),

    /// Rule engine error
    #[error("rules error: {0}")]
    Rules(#[from] chronicle_rules::Error),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] chronicle_core::Error),
}

impl Error {
    /// True for the "absent" family of errors
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::EntityNotFound(_) | Error::NoReciprocal(_) => true,
            Error::Rules(e) => e.is_not_found(),
            Error::Core(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// True when an id or name collided with an existing definition
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::EntityConflict(_) => true,
            Error::Rules(e) => e.is_conflict(),
            Error::Core(e) => e.is_conflict(),
            _ => false,
        }
    }
}

// Compile-time check that Error is Send + Sync for thread-safe error propagation.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
