//! Error types for chronicle-core

use crate::BranchId;
use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// No entry at or before the requested tick in the branch or any ancestor
    #[error("Not found: {0}")]
    NotFound(String),

    /// The branch was never registered in the branch tree
    #[error("Unknown branch: {0}")]
    UnknownBranch(BranchId),

    /// A branch with this name already exists
    #[error("Branch already exists: {0}")]
    BranchConflict(BranchId),
}

impl Error {
    /// True for the "absent in every ancestor" family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::UnknownBranch(_))
    }

    /// True when a name collided with an existing, different definition
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::BranchConflict(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
