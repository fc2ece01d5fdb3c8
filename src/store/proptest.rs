//! Property-Based Tests for the Store
//!
//! # Test Properties
//!
//! 1. **Sortedness**: a user's visit history is ordered by `visited_at` after
//!    any sequence of inserts and updates
//! 2. **Uniqueness**: every indexed visit appears exactly once in each index,
//!    under its current user and location
//! 3. **Bucket order**: ordered buckets stay sorted through add/replace/pop

#![cfg(test)]

use std::collections::HashMap;

use proptest::prelude::*;

use super::bucket::Bucket;
use super::engine::Store;
use crate::config::StoreConfig;
use crate::filter::VisitFilter;
use crate::model::{Gender, Location, User, UserVisit, Visit};

const USERS: u32 = 4;
const LOCATIONS: u32 = 4;

// =============================================================================
// Property Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Add { id: u32, user: u32, location: u32, at: i64, mark: u8 },
    Update { id: u32, user: u32, location: u32, at: i64, mark: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let fields = (1u32..=20, 1..=USERS, 1..=LOCATIONS, -1000i64..1000, 0u8..=5);
    prop_oneof![
        fields
            .clone()
            .prop_map(|(id, user, location, at, mark)| Op::Add { id, user, location, at, mark }),
        fields.prop_map(|(id, user, location, at, mark)| Op::Update { id, user, location, at, mark }),
    ]
}

fn seeded_store() -> Store {
    let store = Store::new(StoreConfig {
        shard_count: 5,
        max_users: 100,
        max_locations: 100,
        max_visits: 100,
        ..Default::default()
    })
    .unwrap();
    for id in 1..=USERS {
        store
            .add_user(User {
                id,
                gender: if id % 2 == 0 { Gender::Female } else { Gender::Male },
                birth_date: i64::from(id) * 1000,
                ..Default::default()
            })
            .unwrap();
    }
    for id in 1..=LOCATIONS {
        store
            .add_location(Location {
                id,
                place: format!("place-{}", id),
                country: format!("country-{}", id % 2),
                distance: id * 10,
                ..Default::default()
            })
            .unwrap();
    }
    store
}

fn history_entry(visit_id: u32, visited_at: i64) -> UserVisit {
    UserVisit {
        mark: 0,
        visited_at,
        place: String::new(),
        visit_id,
        location_id: 1,
        country: String::new(),
        distance: 0,
    }
}

fn is_sorted(visits: &[UserVisit]) -> bool {
    visits.windows(2).all(|w| w[0].visited_at <= w[1].visited_at)
}

// =============================================================================
// Store Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: histories stay sorted and every visit is indexed exactly once
    /// under its current references.
    #[test]
    fn prop_indexes_track_visits(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let store = seeded_store();
        let mut expected: HashMap<u32, Visit> = HashMap::new();

        for op in ops {
            match op {
                Op::Add { id, user, location, at, mark } => {
                    let visit = Visit { id, location, user, visited_at: at, mark, valid: false };
                    if store.add_visit(visit.clone()).is_ok() {
                        prop_assert!(!expected.contains_key(&id));
                        expected.insert(id, visit);
                    }
                }
                Op::Update { id, user, location, at, mark } => {
                    let visit = Visit { id, location, user, visited_at: at, mark, valid: false };
                    let result = store.update_visit(visit.clone());
                    prop_assert_eq!(result.is_ok(), expected.contains_key(&id));
                    if result.is_ok() {
                        expected.insert(id, visit);
                    }
                }
            }
        }

        for user in 1..=USERS {
            let history = store.get_user_visits(user, &VisitFilter::all());
            prop_assert!(is_sorted(&history));
            for entry in &history {
                let visit = &expected[&entry.visit_id];
                prop_assert_eq!(visit.user, user);
                prop_assert_eq!(entry.location_id, visit.location);
                prop_assert_eq!(entry.visited_at, visit.visited_at);
                prop_assert_eq!(entry.mark, visit.mark);
            }
        }

        let mut marks_seen = 0;
        for location in 1..=LOCATIONS {
            for mark in store.get_location_marks(location) {
                let visit = &expected[&mark.visit_id];
                prop_assert_eq!(visit.location, location);
                prop_assert_eq!(mark.user_id, visit.user);
                marks_seen += 1;
            }
        }
        prop_assert_eq!(marks_seen, expected.len());

        let histories: usize = (1..=USERS)
            .map(|u| store.get_user_visits(u, &VisitFilter::all()).len())
            .sum();
        prop_assert_eq!(histories, expected.len());
    }

    /// Property: an ordered bucket is sorted after any mix of mutations.
    #[test]
    fn prop_bucket_stays_sorted(
        dates in prop::collection::vec(-500i64..500, 1..40),
        moves in prop::collection::vec((0usize..40, -500i64..500), 0..20),
        pops in prop::collection::vec(0usize..40, 0..10),
    ) {
        let bucket: Bucket<UserVisit> = Bucket::new();
        for (i, at) in dates.iter().enumerate() {
            bucket.add(history_entry(i as u32, *at));
        }
        for (i, at) in moves {
            bucket.replace(i as u32, history_entry(i as u32, at));
        }
        for i in pops {
            bucket.pop(i as u32);
        }
        prop_assert!(bucket.read(is_sorted));
    }
}
