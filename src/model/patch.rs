//! Partial Update Payloads
//!
//! Update bodies may carry any subset of fields. A field sent as an explicit
//! `null` is rejected at decode time, and a body `id` must match the target.

use serde::{Deserialize, Deserializer};

use super::entity::{Gender, Location, User, Visit};
use crate::error::{Error, Result};

/// Present-but-null fails; absent stays `None` via `#[serde(default)]`
fn non_null<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn check_target(body_id: Option<u32>, id: u32) -> Result<()> {
    match body_id {
        Some(body_id) if body_id != id => Err(Error::validation("id is forbidden in update")),
        _ => Ok(()),
    }
}

/// Partial user update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default, deserialize_with = "non_null")]
    pub id: Option<u32>,
    #[serde(default, deserialize_with = "non_null")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "non_null")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "non_null")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "non_null")]
    pub gender: Option<Gender>,
    #[serde(default, deserialize_with = "non_null")]
    pub birth_date: Option<i64>,
}

impl UserPatch {
    /// Merge onto the stored record
    pub fn apply_to(self, current: &User) -> Result<User> {
        check_target(self.id, current.id)?;
        Ok(User {
            id: current.id,
            email: self.email.unwrap_or_else(|| current.email.clone()),
            first_name: self.first_name.unwrap_or_else(|| current.first_name.clone()),
            last_name: self.last_name.unwrap_or_else(|| current.last_name.clone()),
            gender: self.gender.unwrap_or(current.gender),
            birth_date: self.birth_date.unwrap_or(current.birth_date),
            valid: current.valid,
        })
    }
}

/// Partial location update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationPatch {
    #[serde(default, deserialize_with = "non_null")]
    pub id: Option<u32>,
    #[serde(default, deserialize_with = "non_null")]
    pub place: Option<String>,
    #[serde(default, deserialize_with = "non_null")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "non_null")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "non_null")]
    pub distance: Option<u32>,
}

impl LocationPatch {
    pub fn apply_to(self, current: &Location) -> Result<Location> {
        check_target(self.id, current.id)?;
        Ok(Location {
            id: current.id,
            place: self.place.unwrap_or_else(|| current.place.clone()),
            country: self.country.unwrap_or_else(|| current.country.clone()),
            city: self.city.unwrap_or_else(|| current.city.clone()),
            distance: self.distance.unwrap_or(current.distance),
            valid: current.valid,
        })
    }
}

/// Partial visit update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitPatch {
    #[serde(default, deserialize_with = "non_null")]
    pub id: Option<u32>,
    #[serde(default, deserialize_with = "non_null")]
    pub location: Option<u32>,
    #[serde(default, deserialize_with = "non_null")]
    pub user: Option<u32>,
    #[serde(default, deserialize_with = "non_null")]
    pub visited_at: Option<i64>,
    #[serde(default, deserialize_with = "non_null")]
    pub mark: Option<u8>,
}

impl VisitPatch {
    pub fn apply_to(self, current: &Visit) -> Result<Visit> {
        check_target(self.id, current.id)?;
        Ok(Visit {
            id: current.id,
            location: self.location.unwrap_or(current.location),
            user: self.user.unwrap_or(current.user),
            visited_at: self.visited_at.unwrap_or(current.visited_at),
            mark: self.mark.unwrap_or(current.mark),
            valid: current.valid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_user() -> User {
        User {
            id: 3,
            email: "old@example.com".into(),
            first_name: "Old".into(),
            last_name: "Name".into(),
            gender: Gender::Male,
            birth_date: 10,
            valid: true,
        }
    }

    #[test]
    fn test_patch_merges_present_fields() {
        let patch: UserPatch = serde_json::from_str(r#"{"gender":"f","birth_date":20}"#).unwrap();
        let merged = patch.apply_to(&stored_user()).unwrap();
        assert_eq!(merged.gender, Gender::Female);
        assert_eq!(merged.birth_date, 20);
        assert_eq!(merged.email, "old@example.com");
        assert!(merged.valid);
    }

    #[test]
    fn test_patch_rejects_null() {
        assert!(serde_json::from_str::<UserPatch>(r#"{"email":null}"#).is_err());
        assert!(serde_json::from_str::<VisitPatch>(r#"{"mark":null}"#).is_err());
    }

    #[test]
    fn test_patch_id_must_match() {
        let patch: UserPatch = serde_json::from_str(r#"{"id":4}"#).unwrap();
        assert!(matches!(
            patch.apply_to(&stored_user()),
            Err(Error::Validation(_))
        ));

        let same: UserPatch = serde_json::from_str(r#"{"id":3}"#).unwrap();
        assert!(same.apply_to(&stored_user()).is_ok());
    }

    #[test]
    fn test_visit_patch() {
        let current = Visit {
            id: 1,
            location: 1,
            user: 1,
            visited_at: 100,
            mark: 4,
            valid: true,
        };
        let patch: VisitPatch = serde_json::from_str(r#"{"user":2,"mark":0}"#).unwrap();
        let merged = patch.apply_to(&current).unwrap();
        assert_eq!(merged.user, 2);
        assert_eq!(merged.mark, 0);
        assert_eq!(merged.location, 1);
    }

    #[test]
    fn test_location_patch_empty_body() {
        let current = Location {
            id: 8,
            place: "p".into(),
            country: "c".into(),
            city: "t".into(),
            distance: 3,
            valid: true,
        };
        let patch: LocationPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(patch.apply_to(&current).unwrap(), current);
    }
}
