//! Index Bucket
//!
//! A per-key list of denormalized records behind its own read/write lock.
//! Ordered record kinds are kept sorted by `visited_at` ascending; every
//! mutation restores the order before the write lock is released.

use parking_lot::RwLock;

use crate::model::IndexRecord;

/// Growable, lock-guarded list of index records
#[derive(Debug)]
pub struct Bucket<R> {
    records: RwLock<Vec<R>>,
}

impl<R> Default for Bucket<R> {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

/// Position after every record with `visited_at <= key`
fn upper_bound<R: IndexRecord>(records: &[R], key: i64) -> usize {
    records.partition_point(|r| r.visited_at() <= key)
}

impl<R: IndexRecord> Bucket<R> {
    /// Create an empty bucket
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a record, keeping date order for ordered kinds
    pub fn add(&self, record: R) {
        let mut records = self.records.write();
        if R::ORDERED {
            let at = upper_bound(&records, record.visited_at());
            records.insert(at, record);
        } else {
            records.push(record);
        }
    }

    /// Remove and return the record of `visit_id`
    pub fn pop(&self, visit_id: u32) -> Option<R> {
        let mut records = self.records.write();
        let at = records.iter().position(|r| r.visit_id() == visit_id)?;
        Some(records.remove(at))
    }

    /// Overwrite the record of `visit_id`; false when it is absent
    pub fn replace(&self, visit_id: u32, record: R) -> bool {
        let mut records = self.records.write();
        let Some(at) = records.iter().position(|r| r.visit_id() == visit_id) else {
            return false;
        };
        if R::ORDERED && records[at].visited_at() != record.visited_at() {
            records.remove(at);
            let at = upper_bound(&records, record.visited_at());
            records.insert(at, record);
        } else {
            records[at] = record;
        }
        true
    }

    /// Apply `patch` to every record matching `pred`, returning the count
    pub fn patch_where<P, F>(&self, pred: P, mut patch: F) -> usize
    where
        P: Fn(&R) -> bool,
        F: FnMut(&mut R),
    {
        let mut records = self.records.write();
        let mut patched = 0;
        for record in records.iter_mut().filter(|r| pred(r)) {
            patch(record);
            patched += 1;
        }
        if R::ORDERED && patched > 0 {
            records.sort_by_key(|r| r.visited_at());
        }
        patched
    }

    /// True when a record of `visit_id` is present
    pub fn contains(&self, visit_id: u32) -> bool {
        self.records.read().iter().any(|r| r.visit_id() == visit_id)
    }

    /// Run `f` over the records under the read lock
    pub fn read<T>(&self, f: impl FnOnce(&[R]) -> T) -> T {
        f(&self.records.read())
    }

    /// Copy of the records, taken under the read lock
    pub fn snapshot(&self) -> Vec<R> {
        self.records.read().clone()
    }
}
