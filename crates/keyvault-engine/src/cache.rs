//! Bounded, time-limited cache of unwrapped data keys.

use crate::config::CacheConfig;
use keyvault_core::{KeyId, KeyStatus};
use keyvault_crypto::SecureBytes;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct CachedKey {
    dek: SecureBytes,
    status: KeyStatus,
    cached_at: Instant,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Cache hits.
    pub hits: u64,
    /// Cache misses, including expired entries.
    pub misses: u64,
    /// Entries removed by invalidation or expiry.
    pub evictions: u64,
    /// Current cached keys.
    pub entries: usize,
}

impl CacheStats {
    /// Returns the hit rate.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Data key cache keyed by key id.
///
/// The cache owns its copies of key material; lookups hand out clones.
/// Entries are zeroized when they expire, are evicted, invalidated or
/// cleared.
///
/// Every invalidation advances an epoch. A caller that reads the epoch
/// before loading a key and passes it to [`KeyCache::insert`] cannot
/// repopulate an entry invalidated while the key was being loaded.
pub struct KeyCache {
    entries: Mutex<LruCache<KeyId, CachedKey>>,
    epoch: AtomicU64,
    ttl: Duration,
    stats: Mutex<CacheStats>,
}

impl KeyCache {
    /// Creates a cache.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            epoch: AtomicU64::new(0),
            ttl: config.ttl,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Returns a copy of a live entry.
    pub fn get(&self, id: KeyId) -> Option<(SecureBytes, KeyStatus)> {
        let mut entries = self.entries.lock();
        let mut stats = self.stats.lock();

        let expired = match entries.get(&id) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                stats.hits += 1;
                return Some((entry.dek.clone(), entry.status));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(&id);
            stats.evictions += 1;
        }
        stats.misses += 1;
        None
    }

    /// Returns the current invalidation epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Caches a copy of `dek` unless an invalidation happened since `epoch`.
    ///
    /// Returns true if the key was cached.
    pub fn insert(&self, id: KeyId, dek: &SecureBytes, status: KeyStatus, epoch: u64) -> bool {
        let mut entries = self.entries.lock();
        if self.epoch.load(Ordering::Acquire) != epoch {
            return false;
        }
        let evicted = entries.push(
            id,
            CachedKey {
                dek: dek.clone(),
                status,
                cached_at: Instant::now(),
            },
        );
        drop(entries);
        if matches!(evicted, Some((evicted_id, _)) if evicted_id != id) {
            self.stats.lock().evictions += 1;
        }
        true
    }

    /// Removes the entry for `id`.
    pub fn invalidate(&self, id: KeyId) {
        let mut entries = self.entries.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if entries.pop(&id).is_some() {
            drop(entries);
            self.stats.lock().evictions += 1;
        }
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    /// Returns the number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().clone();
        stats.entries = self.len();
        stats
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}
