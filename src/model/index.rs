//! Denormalized Index Records
//!
//! Copies of user and location fields taken at visit insert/update time, so
//! listing and averaging never join back against the entity tables.

use serde::Serialize;

use super::entity::{Gender, Location, User, Visit};

/// Record stored in an index bucket
pub trait IndexRecord: Clone + Send + Sync + 'static {
    /// Keep the bucket sorted by `visited_at` ascending
    const ORDERED: bool;

    fn visit_id(&self) -> u32;

    fn visited_at(&self) -> i64;
}

/// One mark left at a location, keyed by the location id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationMark {
    pub visit_id: u32,
    pub user_id: u32,
    pub visited_at: i64,
    /// Copied from the user
    pub birth_date: i64,
    /// Copied from the user
    pub gender: Gender,
    pub mark: u8,
}

impl LocationMark {
    pub fn new(visit: &Visit, user: &User) -> Self {
        Self {
            visit_id: visit.id,
            user_id: visit.user,
            visited_at: visit.visited_at,
            birth_date: user.birth_date,
            gender: user.gender,
            mark: visit.mark,
        }
    }
}

impl IndexRecord for LocationMark {
    const ORDERED: bool = false;

    fn visit_id(&self) -> u32 {
        self.visit_id
    }

    fn visited_at(&self) -> i64 {
        self.visited_at
    }
}

/// One entry of a user's visit history, keyed by the user id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserVisit {
    pub mark: u8,
    pub visited_at: i64,
    /// Copied from the location
    pub place: String,
    #[serde(skip)]
    pub visit_id: u32,
    #[serde(skip)]
    pub location_id: u32,
    /// Copied from the location
    #[serde(skip)]
    pub country: String,
    /// Copied from the location
    #[serde(skip)]
    pub distance: u32,
}

impl UserVisit {
    pub fn new(visit: &Visit, location: &Location) -> Self {
        Self {
            mark: visit.mark,
            visited_at: visit.visited_at,
            place: location.place.clone(),
            visit_id: visit.id,
            location_id: visit.location,
            country: location.country.clone(),
            distance: location.distance,
        }
    }
}

impl IndexRecord for UserVisit {
    const ORDERED: bool = true;

    fn visit_id(&self) -> u32 {
        self.visit_id
    }

    fn visited_at(&self) -> i64 {
        self.visited_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_visit_public_shape() {
        let visit = Visit {
            id: 9,
            location: 4,
            user: 2,
            visited_at: 1000,
            mark: 3,
            valid: true,
        };
        let location = Location {
            id: 4,
            place: "Bridge".into(),
            country: "Spain".into(),
            city: "Bilbao".into(),
            distance: 12,
            valid: true,
        };
        let record = UserVisit::new(&visit, &location);
        assert_eq!(record.country, "Spain");
        assert_eq!(record.location_id, 4);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"mark": 3, "visited_at": 1000, "place": "Bridge"})
        );
    }

    #[test]
    fn test_location_mark_copies_user_fields() {
        let visit = Visit {
            id: 1,
            location: 1,
            user: 5,
            visited_at: 10,
            mark: 4,
            valid: true,
        };
        let user = User {
            id: 5,
            gender: Gender::Female,
            birth_date: -100,
            valid: true,
            ..Default::default()
        };
        let mark = LocationMark::new(&visit, &user);
        assert_eq!(mark.user_id, 5);
        assert_eq!(mark.gender, Gender::Female);
        assert_eq!(mark.birth_date, -100);
        assert!(!LocationMark::ORDERED);
        assert!(UserVisit::ORDERED);
    }
}
