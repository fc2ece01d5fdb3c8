//! Bucket Index
//!
//! Maps a key (location id or user id) to its lazily created [`Bucket`].
//!
//! # Lazy creation
//!
//! `get_or_create` is double-checked: an optimistic lookup under the shard's
//! read lock, then, on a miss, the shard's write lock is taken, the map is
//! checked again and the bucket is built and published only if still absent.
//! Concurrent first accesses for one key therefore all receive the same
//! `Arc`; a second instance for a key can never be published.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::bucket::Bucket;
use super::sharded_lock::ShardedLock;
use crate::model::IndexRecord;

/// Family of buckets keyed by id
pub struct BucketIndex<R> {
    /// Index name for logs
    name: &'static str,
    /// Per-shard bucket maps
    buckets: ShardedLock<HashMap<u32, Arc<Bucket<R>>>>,
    /// Number of published buckets
    created: AtomicU64,
}

impl<R: IndexRecord> BucketIndex<R> {
    /// Create an empty index
    pub fn new(name: &'static str, shard_count: usize) -> Self {
        Self {
            name,
            buckets: ShardedLock::new(shard_count),
            created: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of buckets created so far
    pub fn len(&self) -> usize {
        self.created.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Existing bucket for `id`, without creating one
    pub fn get(&self, id: u32) -> Option<Arc<Bucket<R>>> {
        self.buckets.read(id).get(&id).cloned()
    }

    /// Bucket for `id`, creating and publishing it exactly once
    pub fn get_or_create(&self, id: u32) -> Arc<Bucket<R>> {
        // Try read first
        if let Some(bucket) = self.get(id) {
            return bucket;
        }

        let mut guard = self.buckets.write(id);

        // Double-check under write lock
        if let Some(bucket) = guard.get(&id) {
            return Arc::clone(bucket);
        }

        let bucket = Arc::new(Bucket::new());
        guard.insert(id, Arc::clone(&bucket));
        self.created.fetch_add(1, Ordering::Relaxed);
        trace!(index = self.name, id, "bucket created");
        bucket
    }
}
