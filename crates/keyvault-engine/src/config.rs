//! Key manager configuration.

use std::time::Duration;

/// Deadlines applied to every external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for a single key vault store call.
    pub store: Duration,
    /// Deadline for a single master key provider call.
    pub provider: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_secs(5),
            provider: Duration::from_secs(10),
        }
    }
}

/// Data key cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cached keys.
    pub capacity: usize,
    /// Time-to-live of a cached key.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            ttl: Duration::from_secs(60),
        }
    }
}

/// What `delete_key` checks before removing a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Delete without consulting the reference checker.
    Force,
    /// Refuse with `KeyInUse` while known ciphertexts reference the key.
    #[default]
    RequireUnreferenced,
}

/// Key manager configuration.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    /// External call deadlines.
    pub timeouts: Timeouts,
    /// Data key cache; `None` disables caching.
    pub cache: Option<CacheConfig>,
    /// Default deletion policy.
    pub delete_policy: DeletePolicy,
}

impl ManagerConfig {
    /// Sets the timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Enables the data key cache.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the default deletion policy.
    #[must_use]
    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }
}
