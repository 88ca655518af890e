//! Engine Configuration - caching mode, root branch and result-cache policy
//!
//! Configuration can be built in code or loaded from RON:
//!
//! ```
//! use chronicle_rules::{EngineConfig, ResultCachePolicy};
//!
//! let config = EngineConfig::from_ron(
//!     "(caching: false, trunk: \"main\", result_cache: PerRule(capacity: 64))",
//! )
//! .unwrap();
//! assert!(!config.caching);
//! assert_eq!(config.trunk.as_str(), "main");
//! assert_eq!(config.result_cache, ResultCachePolicy::PerRule { capacity: 64 });
//! ```

use crate::Result;
use chronicle_core::BranchId;
use serde::{Deserialize, Serialize};

/// How trigger and prereq results are retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResultCachePolicy {
    /// Keep every result for the life of the engine
    ///
    /// Memory grows with every distinct (function, branch, tick, args) that is
    /// evaluated. Use `Engine::forget_branch` or `Engine::clear_results` to
    /// reclaim it.
    #[default]
    Unbounded,
    /// Keep at most `capacity` results per rule and function kind, evicting
    /// the oldest first
    PerRule { capacity: usize },
}

impl ResultCachePolicy {
    /// Maximum entries per cache, `None` if unbounded
    pub fn capacity(&self) -> Option<usize> {
        match self {
            ResultCachePolicy::Unbounded => None,
            ResultCachePolicy::PerRule { capacity } => Some(*capacity),
        }
    }
}

/// Configuration for an `Engine`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Start with in-memory caching of store lookups enabled
    pub caching: bool,
    /// Name of the root branch for a fresh store
    pub trunk: BranchId,
    /// Retention of trigger/prereq results
    pub result_cache: ResultCachePolicy,
}

impl EngineConfig {
    /// Set the initial caching mode
    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    /// Set the root branch name
    pub fn with_trunk(mut self, trunk: impl Into<BranchId>) -> Self {
        self.trunk = trunk.into();
        self
    }

    /// Set the result-cache policy
    ///
    /// A `PerRule` capacity of zero is raised to one.
    pub fn with_result_cache(mut self, policy: ResultCachePolicy) -> Self {
        self.result_cache = match policy {
            ResultCachePolicy::PerRule { capacity } => ResultCachePolicy::PerRule {
                capacity: capacity.max(1),
            },
            other => other,
        };
        self
    }

    /// Parse a configuration from RON; missing fields take their defaults
    pub fn from_ron(text: &str) -> Result<Self> {
        let config: EngineConfig = ron::from_str(text)?;
        let policy = config.result_cache;
        Ok(config.with_result_cache(policy))
    }

    /// Render this configuration as pretty RON
    pub fn to_ron(&self) -> Result<String> {
        let pretty = ron::ser::PrettyConfig::default();
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }
}

impl Default for EngineConfig {
    /// Caching on, `trunk` root, unbounded result caches
    fn default() -> Self {
        Self {
            caching: true,
            trunk: BranchId::trunk(),
            result_cache: ResultCachePolicy::Unbounded,
        }
    }
}
