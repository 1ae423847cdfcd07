//! Bounded cache of tile resources.
//!
//! The cache tracks which resources stay warm after their tiles are gone.
//! Resources themselves live in the scheduler's store; this cache only keeps
//! their identities in recency order and decides which one to drop.
//!
//! # Eviction
//!
//! The capacity is a soft limit. When an insertion pushes the cache over
//! capacity, entries are scanned from least to most recently added and the
//! ones the caller reports as evictable are removed until the cache is back
//! at its limit. If no entry is evictable, the cache temporarily overflows.

use lru::LruCache;

use crate::pyramid::TileId;

/// Default number of cached resources.
pub const DEFAULT_CACHE_LIMIT: usize = 200;

// =============================================================================
// Resource Cache
// =============================================================================

/// Insertion-ordered set of cached resource identities.
pub struct ResourceCache {
    /// Identities, most recently added first
    entries: LruCache<TileId, ()>,

    /// Soft capacity
    limit: usize,
}

impl ResourceCache {
    /// Create a cache with the default limit.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_CACHE_LIMIT)
    }

    /// Create a cache holding at most `limit` evictable entries.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            limit,
        }
    }

    /// Add an identity, moving it to the tail if already present.
    ///
    /// While over the limit, the oldest evictable entry is removed. Returns
    /// the evicted identities, oldest first. The caller owns the evicted
    /// resources and is responsible for destroying them.
    pub fn add(&mut self, id: TileId, is_evictable: impl Fn(&TileId) -> bool) -> Vec<TileId> {
        self.entries.put(id, ());

        let mut evicted = Vec::new();
        while self.entries.len() > self.limit {
            // Oldest first
            let Some(victim) = self
                .entries
                .iter()
                .rev()
                .map(|(key, _)| *key)
                .find(|key| is_evictable(key))
            else {
                break;
            };

            self.entries.pop(&victim);
            evicted.push(victim);
        }
        evicted
    }

    /// Whether the identity is cached. Does not change recency.
    pub fn contains(&self, id: &TileId) -> bool {
        self.entries.contains(id)
    }

    /// Remove an identity without destroying its resource.
    pub fn remove_by_key(&mut self, id: &TileId) -> bool {
        self.entries.pop(id).is_some()
    }

    /// Empty the cache, returning every identity it held.
    pub fn clear(&mut self) -> Vec<TileId> {
        let ids = self.entries.iter().map(|(key, _)| *key).collect();
        self.entries.clear();
        ids
    }

    /// Identities from oldest to newest.
    pub fn keys(&self) -> Vec<TileId> {
        self.entries.iter().rev().map(|(key, _)| *key).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Soft capacity.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
