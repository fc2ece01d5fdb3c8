//! Response Cache
//!
//! Memoizes serialized entity bodies keyed by request path
//! (`/users/1`, `/visits/7`, ...). Entries are filled on a successful GET or
//! insert and dropped when an update to the same entity succeeds.
//!
//! Each key carries a generation that [`ResponseCache::invalidate`] bumps. A
//! reader samples it with [`ResponseCache::generation`] before rendering and
//! passes it to [`ResponseCache::fill`], which refuses the body if an update
//! landed in between.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use dashmap::DashMap;

use crate::model::EntityKind;

/// Cache key of an entity's GET response
pub fn entity_key(kind: EntityKind, id: u32) -> String {
    format!("/{}/{}", kind.route(), id)
}

/// Snapshot of the cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub lookups: u64,
    pub entries: usize,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    body: Option<Bytes>,
}

/// Concurrent path -> body cache
#[derive(Default)]
pub struct ResponseCache {
    slots: DashMap<String, Slot>,
    /// Slots currently holding a body
    filled: AtomicUsize,
    hits: AtomicU64,
    lookups: AtomicU64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached body for `key`
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let body = self.slots.get(key).and_then(|slot| slot.body.clone())?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(body)
    }

    /// Current generation of `key`; sample before rendering a body to fill
    pub fn generation(&self, key: &str) -> u64 {
        self.slots.get(key).map_or(0, |slot| slot.generation)
    }

    /// Store `body` if `key` has not been invalidated since `generation`
    /// was sampled. Returns whether the body was stored.
    pub fn fill(&self, key: &str, generation: u64, body: Bytes) -> bool {
        let mut slot = self.slots.entry(key.to_string()).or_default();
        if slot.generation != generation {
            return false;
        }
        if slot.body.replace(body).is_none() {
            self.filled.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Drop the body for `key` and bump its generation, returning whether a
    /// body was present
    pub fn invalidate(&self, key: &str) -> bool {
        let mut slot = self.slots.entry(key.to_string()).or_default();
        slot.generation += 1;
        let dropped = slot.body.take().is_some();
        if dropped {
            self.filled.fetch_sub(1, Ordering::Relaxed);
        }
        dropped
    }

    pub fn entry_count(&self) -> usize {
        self.filled.load(Ordering::Relaxed)
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hit_count(),
            lookups: self.lookup_count(),
            entries: self.entry_count(),
        }
    }

    /// Zero the hit and lookup counters; entries are kept
    pub fn reset_statistics(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.lookups.store(0, Ordering::Relaxed);
    }
}
