//! Sharded Lock
//!
//! A fixed array of independent read/write locks, each guarding its own slice
//! of data. An id maps to shard `id % shard_count`.
//!
//! # Design
//!
//! - Each shard has its own RwLock, minimizing contention
//! - Prime shard counts keep dense ids from clustering
//! - Cache-line padding between shards prevents false sharing
//!
//! Locks are not reentrant: a caller holding a guard for one id must not
//! take another guard on the same `ShardedLock` for an id of the same shard.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Single shard: its lock plus access statistics
struct Shard<T> {
    lock: RwLock<T>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl<T> Shard<T> {
    fn new(value: T) -> Self {
        Self {
            lock: RwLock::new(value),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }
}

/// Array of read/write locks selected by `id % shard_count`
pub struct ShardedLock<T> {
    shards: Box<[CachePadded<Shard<T>>]>,
}

impl<T: Default> ShardedLock<T> {
    /// Create `shard_count` shards holding `T::default()`
    pub fn new(shard_count: usize) -> Self {
        Self::with_init(shard_count, |_| T::default())
    }
}

impl<T> ShardedLock<T> {
    /// Create shards, building each shard's data with `init(shard_index)`
    pub fn with_init(shard_count: usize, mut init: impl FnMut(usize) -> T) -> Self {
        let shards: Vec<CachePadded<Shard<T>>> = (0..shard_count.max(1))
            .map(|i| CachePadded::new(Shard::new(init(i))))
            .collect();
        Self {
            shards: shards.into_boxed_slice(),
        }
    }

    /// Get the shard count
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard serving `id`
    #[inline]
    pub fn shard_index(&self, id: u32) -> usize {
        id as usize % self.shards.len()
    }

    /// Take the read lock of `id`'s shard
    #[inline]
    pub fn read(&self, id: u32) -> RwLockReadGuard<'_, T> {
        self.read_shard(self.shard_index(id))
    }

    /// Take the write lock of `id`'s shard
    #[inline]
    pub fn write(&self, id: u32) -> RwLockWriteGuard<'_, T> {
        self.write_shard(self.shard_index(id))
    }

    /// Take the read lock of a shard by index
    pub fn read_shard(&self, index: usize) -> RwLockReadGuard<'_, T> {
        let shard = &self.shards[index % self.shards.len()];
        shard.reads.fetch_add(1, Ordering::Relaxed);
        shard.lock.read()
    }

    /// Take the write lock of a shard by index
    pub fn write_shard(&self, index: usize) -> RwLockWriteGuard<'_, T> {
        let shard = &self.shards[index % self.shards.len()];
        shard.writes.fetch_add(1, Ordering::Relaxed);
        shard.lock.write()
    }

    /// Get total read lock acquisitions
    pub fn total_reads(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.reads.load(Ordering::Relaxed))
            .sum()
    }

    /// Get total write lock acquisitions
    pub fn total_writes(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.writes.load(Ordering::Relaxed))
            .sum()
    }
}
