//! Entity Table
//!
//! Dense slot storage for one record kind, indexed directly by id. Ids are
//! spread over the shards of a [`ShardedLock`]; shard `s` stores ids
//! `s, s + n, s + 2n, ...` in a `Vec` at slot `id / n`. Slots grow on demand
//! up to the configured capacity and are never compacted.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::sharded_lock::ShardedLock;
use crate::config::Limits;
use crate::error::{Error, Result};
use crate::model::Record;

/// Array-backed table guarded by a sharded lock
pub struct EntityTable<T> {
    /// Highest storable id
    capacity: u32,
    /// Per-shard slot vectors
    slots: ShardedLock<Vec<T>>,
    /// Number of valid records
    count: AtomicU64,
}

impl<T: Record> EntityTable<T> {
    /// Create a table with `shard_count` shards and ids up to `capacity`
    pub fn new(shard_count: usize, capacity: u32) -> Self {
        Self {
            capacity,
            slots: ShardedLock::new(shard_count),
            count: AtomicU64::new(0),
        }
    }

    /// Highest storable id
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of valid records
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn slot(&self, id: u32) -> usize {
        id as usize / self.slots.shard_count()
    }

    /// Stored record, or an invalid default when out of range or never written
    pub fn get(&self, id: u32) -> T {
        if id > self.capacity {
            return T::default();
        }
        let slot = self.slot(id);
        let guard = self.slots.read(id);
        guard.get(slot).cloned().unwrap_or_default()
    }

    /// True when a valid record is stored under `id`
    pub fn contains(&self, id: u32) -> bool {
        self.view(id).get().is_some()
    }

    /// Validate, then store unless a valid record already holds the id
    pub fn add(&self, v: T, limits: &Limits) -> Result<()> {
        v.validate(limits)?;
        self.entry(v.id())?.insert(v)
    }

    /// Read-locked view of one id's slot
    pub fn view(&self, id: u32) -> TableView<'_, T> {
        TableView {
            guard: self.slots.read(id),
            slot: if id > self.capacity {
                None
            } else {
                Some(self.slot(id))
            },
        }
    }

    /// Write-locked handle to one id's slot.
    ///
    /// The shard stays locked until the handle drops, so check-then-act
    /// sequences on the slot are atomic.
    pub fn entry(&self, id: u32) -> Result<TableEntry<'_, T>> {
        if id > self.capacity {
            return Err(Error::CapacityExceeded {
                entity: T::KIND,
                id,
                capacity: self.capacity,
            });
        }
        Ok(TableEntry {
            guard: self.slots.write(id),
            slot: self.slot(id),
            id,
            count: &self.count,
        })
    }
}

/// Read guard over one slot
pub struct TableView<'a, T> {
    guard: RwLockReadGuard<'a, Vec<T>>,
    slot: Option<usize>,
}

impl<T: Record> TableView<'_, T> {
    /// The stored record, if valid
    pub fn get(&self) -> Option<&T> {
        self.slot
            .and_then(|slot| self.guard.get(slot))
            .filter(|v| v.is_valid())
    }
}

/// Write guard over one slot
pub struct TableEntry<'a, T> {
    guard: RwLockWriteGuard<'a, Vec<T>>,
    slot: usize,
    id: u32,
    count: &'a AtomicU64,
}

impl<T: Record> TableEntry<'_, T> {
    /// The stored record, if valid
    pub fn get(&self) -> Option<&T> {
        self.guard.get(self.slot).filter(|v| v.is_valid())
    }

    /// Store `v` unless a valid record already holds the slot
    pub fn insert(&mut self, v: T) -> Result<()> {
        if self.get().is_some() {
            return Err(Error::AlreadyExists {
                entity: T::KIND,
                id: self.id,
            });
        }
        self.store(v);
        Ok(())
    }

    /// Validate, then overwrite the slot with `v`
    pub fn update(&mut self, v: T, limits: &Limits) -> Result<()> {
        v.validate(limits)?;
        self.store(v);
        Ok(())
    }

    /// Overwrite the slot with `v`, flagged valid
    pub fn store(&mut self, mut v: T) {
        debug_assert_eq!(v.id(), self.id);
        v.mark_valid();
        if self.guard.len() <= self.slot {
            self.guard.resize_with(self.slot + 1, T::default);
        }
        if !self.guard[self.slot].is_valid() {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        self.guard[self.slot] = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, Gender, User};
    use assert_matches::assert_matches;

    fn user(id: u32, email: &str) -> User {
        User {
            id,
            email: email.into(),
            first_name: "F".into(),
            last_name: "L".into(),
            gender: Gender::Male,
            birth_date: 0,
            valid: false,
        }
    }

    fn table() -> EntityTable<User> {
        EntityTable::new(7, 1000)
    }

    #[test]
    fn test_get_missing_is_invalid() {
        let t = table();
        assert!(!t.get(5).valid);
        assert!(!t.get(999_999).valid);
        assert!(t.is_empty());
    }

    #[test]
    fn test_add_and_get() {
        let t = table();
        t.add(user(5, "a@x"), &Limits::default()).unwrap();

        let stored = t.get(5);
        assert!(stored.valid);
        assert_eq!(stored.email, "a@x");
        assert!(t.contains(5));
        assert!(!t.contains(12)); // same shard, different slot
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_duplicate_add_rejected_and_untouched() {
        let t = table();
        t.add(user(5, "first"), &Limits::default()).unwrap();

        let err = t.add(user(5, "second"), &Limits::default()).unwrap_err();
        assert_matches!(
            err,
            Error::AlreadyExists {
                entity: EntityKind::User,
                id: 5
            }
        );
        assert_eq!(t.get(5).email, "first");
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_validation_before_store() {
        let t = table();
        let err = t.add(user(0, "zero"), &Limits::default()).unwrap_err();
        assert_matches!(err, Error::Validation(_));
        assert!(t.is_empty());
    }

    #[test]
    fn test_capacity_exceeded() {
        let t = table();
        let err = t.add(user(1001, "big"), &Limits::default()).unwrap_err();
        assert_matches!(err, Error::CapacityExceeded { capacity: 1000, .. });
        // The ceiling itself is storable
        t.add(user(1000, "edge"), &Limits::default()).unwrap();
    }

    #[test]
    fn test_update_overwrites() {
        let t = table();
        t.add(user(9, "old"), &Limits::default()).unwrap();
        t.entry(9).unwrap().update(user(9, "new"), &Limits::default()).unwrap();

        let stored = t.get(9);
        assert_eq!(stored.email, "new");
        assert!(stored.valid);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_invalid_update_leaves_slot() {
        let t = table();
        t.add(user(4, "kept"), &Limits::default()).unwrap();

        let mut bad = user(4, "x");
        bad.first_name = "F".repeat(51);
        let err = t.entry(4).unwrap().update(bad, &Limits::default()).unwrap_err();
        assert_matches!(err, Error::Validation(_));
        assert_eq!(t.get(4).email, "kept");
    }

    #[test]
    fn test_entry_holds_lock_across_check_and_store() {
        let t = table();
        {
            let mut entry = t.entry(3).unwrap();
            assert!(entry.get().is_none());
            entry.insert(user(3, "held")).unwrap();
            assert_eq!(entry.get().unwrap().email, "held");
        }
        assert_eq!(t.view(3).get().map(|u| u.email.clone()), Some("held".into()));
    }

    #[test]
    fn test_concurrent_duplicate_inserts_single_winner() {
        use std::sync::Arc;
        use std::thread;

        let t = Arc::new(table());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let t = Arc::clone(&t);
                thread::spawn(move || t.add(user(42, &format!("t{}", i)), &Limits::default()).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(t.len(), 1);
    }
}
