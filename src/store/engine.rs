//! Store façade
//!
//! Public entry points of the storage engine. Each write runs while the
//! target record's table slot is write-locked, so writes to one id are
//! serialized end to end, index maintenance included.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::bucket::Bucket;
use super::index::BucketIndex;
use super::table::EntityTable;
use crate::config::{Limits, StoreConfig};
use crate::error::{Error, Result};
use crate::filter::{average_mark, MarkFilter, VisitFilter};
use crate::model::{
    IndexRecord, Location, LocationMark, LocationPatch, Record, User, UserPatch, UserVisit, Visit,
    VisitPatch,
};

/// Record and bucket counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub users: usize,
    pub locations: usize,
    pub visits: usize,
    /// Buckets in the per-location marks index
    pub location_mark_buckets: usize,
    /// Buckets in the per-user visits index
    pub user_visit_buckets: usize,
}

/// In-memory travel data store
pub struct Store {
    config: StoreConfig,
    users: EntityTable<User>,
    locations: EntityTable<Location>,
    visits: EntityTable<Visit>,
    location_marks: BucketIndex<LocationMark>,
    user_visits: BucketIndex<UserVisit>,
}

/// An index record expected by the visit protocols is gone. The indexes no
/// longer agree with the visit table, so nothing may continue.
#[cold]
fn index_corruption(index: &str, key: u32, visit_id: u32) -> ! {
    error!(index, key, visit_id, "index record missing, aborting");
    panic!(
        "index corruption: visit {} missing from {}[{}]",
        visit_id, index, key
    );
}

/// Pop a record that must be present
fn pop_expected<R: IndexRecord>(index: &BucketIndex<R>, key: u32, visit_id: u32) -> R {
    match index.get(key).and_then(|bucket| bucket.pop(visit_id)) {
        Some(record) => record,
        None => index_corruption(index.name(), key, visit_id),
    }
}

/// Overwrite a record that must be present
fn replace_expected<R: IndexRecord>(index: &BucketIndex<R>, key: u32, visit_id: u32, record: R) {
    let replaced = index
        .get(key)
        .map(|bucket| bucket.replace(visit_id, record))
        .unwrap_or(false);
    if !replaced {
        index_corruption(index.name(), key, visit_id);
    }
}

impl Store {
    /// Create an empty store
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let shards = config.shard_count;
        Ok(Self {
            users: EntityTable::new(shards, config.max_users),
            locations: EntityTable::new(shards, config.max_locations),
            visits: EntityTable::new(shards, config.max_visits),
            location_marks: BucketIndex::new("location_marks", shards),
            user_visits: BucketIndex::new("user_visits", shards),
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn limits(&self) -> &Limits {
        &self.config.limits
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            users: self.users.len(),
            locations: self.locations.len(),
            visits: self.visits.len(),
            location_mark_buckets: self.location_marks.len(),
            user_visit_buckets: self.user_visits.len(),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Stored user, or an invalid default
    pub fn get_user(&self, id: u32) -> User {
        self.users.get(id)
    }

    /// Stored location, or an invalid default
    pub fn get_location(&self, id: u32) -> Location {
        self.locations.get(id)
    }

    /// Stored visit, or an invalid default
    pub fn get_visit(&self, id: u32) -> Visit {
        self.visits.get(id)
    }

    pub fn has_user(&self, id: u32) -> bool {
        self.users.contains(id)
    }

    pub fn has_location(&self, id: u32) -> bool {
        self.locations.contains(id)
    }

    pub fn has_visit(&self, id: u32) -> bool {
        self.visits.contains(id)
    }

    /// Visit history bucket of a user, created on first reference.
    ///
    /// `None` for ids no user can ever hold, so probing arbitrary ids does not
    /// grow the index.
    pub fn user_visits_bucket(&self, user_id: u32) -> Option<Arc<Bucket<UserVisit>>> {
        if user_id == 0 || user_id > self.config.max_users {
            return None;
        }
        Some(self.user_visits.get_or_create(user_id))
    }

    /// Marks bucket of a location, created on first reference
    pub fn location_marks_bucket(&self, location_id: u32) -> Option<Arc<Bucket<LocationMark>>> {
        if location_id == 0 || location_id > self.config.max_locations {
            return None;
        }
        Some(self.location_marks.get_or_create(location_id))
    }

    /// Visits of a user matching `filter`, ordered by `visited_at`
    pub fn get_user_visits(&self, user_id: u32, filter: &VisitFilter) -> Vec<UserVisit> {
        match self.user_visits_bucket(user_id) {
            Some(bucket) => bucket.read(|visits| filter.apply(visits)),
            None => Vec::new(),
        }
    }

    /// Every mark left at a location
    pub fn get_location_marks(&self, location_id: u32) -> Vec<LocationMark> {
        match self.location_marks_bucket(location_id) {
            Some(bucket) => bucket.snapshot(),
            None => Vec::new(),
        }
    }

    /// Mean mark at a location over the marks matching `filter`
    pub fn get_location_average_mark(&self, location_id: u32, filter: &MarkFilter) -> f64 {
        match self.location_marks_bucket(location_id) {
            Some(bucket) => bucket.read(|marks| average_mark(marks, filter)),
            None => 0.0,
        }
    }

    // =========================================================================
    // Inserts
    // =========================================================================

    pub fn add_user(&self, user: User) -> Result<()> {
        let id = user.id;
        self.users.add(user, self.limits())?;
        debug!(id, "user added");
        Ok(())
    }

    pub fn add_location(&self, location: Location) -> Result<()> {
        let id = location.id;
        self.locations.add(location, self.limits())?;
        debug!(id, "location added");
        Ok(())
    }

    /// Store a visit and index it under its location and user.
    ///
    /// Unless `strict_foreign_keys` is set, the visit row is written before
    /// its references are checked: an unknown location or user fails the
    /// insert but leaves the row in place without index entries.
    pub fn add_visit(&self, visit: Visit) -> Result<()> {
        visit.validate(self.limits())?;

        let mut entry = self.visits.entry(visit.id)?;
        if entry.get().is_some() {
            return Err(Error::AlreadyExists {
                entity: Visit::KIND,
                id: visit.id,
            });
        }
        if self.config.strict_foreign_keys {
            self.check_references(&visit)?;
        }
        entry.store(visit.clone());

        let location_view = self.locations.view(visit.location);
        let Some(location) = location_view.get() else {
            warn!(id = visit.id, location = visit.location, "visit stored with unknown location");
            return Err(Error::UnknownLocation(visit.location));
        };
        let user_view = self.users.view(visit.user);
        let Some(user) = user_view.get() else {
            warn!(id = visit.id, user = visit.user, "visit stored with unknown user");
            return Err(Error::UnknownUser(visit.user));
        };

        self.location_marks
            .get_or_create(visit.location)
            .add(LocationMark::new(&visit, user));
        self.user_visits
            .get_or_create(visit.user)
            .add(UserVisit::new(&visit, location));

        debug!(
            id = visit.id,
            user = visit.user,
            location = visit.location,
            "visit added"
        );
        Ok(())
    }

    fn check_references(&self, visit: &Visit) -> Result<()> {
        if !self.locations.contains(visit.location) {
            return Err(Error::UnknownLocation(visit.location));
        }
        if !self.users.contains(visit.user) {
            return Err(Error::UnknownUser(visit.user));
        }
        Ok(())
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Overwrite an existing user, refreshing the marks that copy its fields
    pub fn update_user(&self, user: User) -> Result<()> {
        self.modify_user(user.id, |_| Ok(user))
    }

    /// Merge a partial update onto an existing user
    pub fn patch_user(&self, id: u32, patch: UserPatch) -> Result<()> {
        self.modify_user(id, |current| patch.apply_to(current))
    }

    fn modify_user(&self, id: u32, f: impl FnOnce(&User) -> Result<User>) -> Result<()> {
        let mut entry = self.users.entry(id)?;
        let old = entry.get().ok_or(Error::NotFound {
            entity: User::KIND,
            id,
        })?;
        let user = f(old)?;
        let copied_changed = old.birth_date != user.birth_date || old.gender != user.gender;

        entry.update(user, self.limits())?;
        if let Some(user) = entry.get().filter(|_| copied_changed) {
            let patched = self.propagate_user(user);
            debug!(id, patched, "user fields propagated to marks");
        }
        Ok(())
    }

    /// Rewrite the user's copied fields in every mark they left
    fn propagate_user(&self, user: &User) -> usize {
        let Some(visits) = self.user_visits.get(user.id) else {
            return 0;
        };
        let location_ids: HashSet<u32> =
            visits.read(|records| records.iter().map(|v| v.location_id).collect());

        location_ids
            .into_iter()
            .filter_map(|location_id| self.location_marks.get(location_id))
            .map(|marks| {
                marks.patch_where(
                    |m| m.user_id == user.id,
                    |m| {
                        m.birth_date = user.birth_date;
                        m.gender = user.gender;
                    },
                )
            })
            .sum()
    }

    /// Overwrite an existing location, refreshing the visit histories that
    /// copy its fields
    pub fn update_location(&self, location: Location) -> Result<()> {
        self.modify_location(location.id, |_| Ok(location))
    }

    /// Merge a partial update onto an existing location
    pub fn patch_location(&self, id: u32, patch: LocationPatch) -> Result<()> {
        self.modify_location(id, |current| patch.apply_to(current))
    }

    fn modify_location(
        &self,
        id: u32,
        f: impl FnOnce(&Location) -> Result<Location>,
    ) -> Result<()> {
        let mut entry = self.locations.entry(id)?;
        let old = entry.get().ok_or(Error::NotFound {
            entity: Location::KIND,
            id,
        })?;
        let location = f(old)?;
        let copied_changed = old.place != location.place
            || old.country != location.country
            || old.distance != location.distance;

        entry.update(location, self.limits())?;
        if let Some(location) = entry.get().filter(|_| copied_changed) {
            let patched = self.propagate_location(location);
            debug!(id, patched, "location fields propagated to visits");
        }
        Ok(())
    }

    /// Rewrite the location's copied fields in every visit history entry
    fn propagate_location(&self, location: &Location) -> usize {
        let Some(marks) = self.location_marks.get(location.id) else {
            return 0;
        };
        let user_ids: HashSet<u32> =
            marks.read(|records| records.iter().map(|m| m.user_id).collect());

        user_ids
            .into_iter()
            .filter_map(|user_id| self.user_visits.get(user_id))
            .map(|visits| {
                visits.patch_where(
                    |v| v.location_id == location.id,
                    |v| {
                        v.place.clone_from(&location.place);
                        v.country.clone_from(&location.country);
                        v.distance = location.distance;
                    },
                )
            })
            .sum()
    }

    /// Overwrite an existing visit, moving its index records when the user
    /// or location changes
    pub fn update_visit(&self, visit: Visit) -> Result<()> {
        self.modify_visit(visit.id, |_| Ok(visit))
    }

    /// Merge a partial update onto an existing visit
    pub fn patch_visit(&self, id: u32, patch: VisitPatch) -> Result<()> {
        self.modify_visit(id, |current| patch.apply_to(current))
    }

    fn modify_visit(&self, id: u32, f: impl FnOnce(&Visit) -> Result<Visit>) -> Result<()> {
        let mut entry = self.visits.entry(id)?;
        let old = entry.get().cloned().ok_or(Error::NotFound {
            entity: Visit::KIND,
            id,
        })?;
        let visit = f(&old)?;

        // New references must resolve before anything moves
        let location_view = self.locations.view(visit.location);
        let location = location_view
            .get()
            .ok_or(Error::UnknownLocation(visit.location))?;
        let user_view = self.users.view(visit.user);
        let user = user_view.get().ok_or(Error::UnknownUser(visit.user))?;

        let mark = LocationMark::new(&visit, user);
        let history = UserVisit::new(&visit, location);
        let (new_user, new_location) = (visit.user, visit.location);
        entry.update(visit, self.limits())?;

        if !self.is_indexed(&old) {
            // Row left behind by a failed insert
            warn!(id, "indexing previously unindexed visit");
            self.location_marks.get_or_create(new_location).add(mark);
            self.user_visits.get_or_create(new_user).add(history);
            return Ok(());
        }

        if old.user != new_user {
            pop_expected(&self.user_visits, old.user, id);
            self.user_visits.get_or_create(new_user).add(history);
        } else {
            replace_expected(&self.user_visits, new_user, id, history);
        }

        if old.location != new_location {
            pop_expected(&self.location_marks, old.location, id);
            self.location_marks.get_or_create(new_location).add(mark);
        } else {
            replace_expected(&self.location_marks, new_location, id, mark);
        }

        debug!(
            id,
            user = new_user,
            location = new_location,
            "visit updated"
        );
        Ok(())
    }

    fn is_indexed(&self, visit: &Visit) -> bool {
        let in_history = self
            .user_visits
            .get(visit.user)
            .map_or(false, |b| b.contains(visit.id));
        let in_marks = self
            .location_marks
            .get(visit.location)
            .map_or(false, |b| b.contains(visit.id));
        in_history || in_marks
    }
}
