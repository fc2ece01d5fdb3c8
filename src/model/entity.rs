//! Primary Entities
//!
//! Every entity carries a `valid` flag that is never serialized. A default
//! value is the "invalid" record returned for ids that were never stored.

use serde::{Deserialize, Serialize};

use crate::config::Limits;
use crate::error::{Error, Result};

/// Entity kinds, also used as route names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Location,
    Visit,
}

impl EntityKind {
    /// Resolve a route segment (`users`, `locations`, `visits`)
    pub fn from_route(route: &str) -> Option<Self> {
        match route {
            "users" => Some(EntityKind::User),
            "locations" => Some(EntityKind::Location),
            "visits" => Some(EntityKind::Visit),
            _ => None,
        }
    }

    /// Route segment for this kind
    pub fn route(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Location => "locations",
            EntityKind::Visit => "visits",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::User => write!(f, "user"),
            EntityKind::Location => write!(f, "location"),
            EntityKind::Visit => write!(f, "visit"),
        }
    }
}

/// Gender, serialized as `"m"` / `"f"`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    #[serde(rename = "m")]
    Male,
    #[serde(rename = "f")]
    Female,
}

impl Gender {
    /// Parse a single-letter gender code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "m" => Some(Gender::Male),
            "f" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            Gender::Male => 'm',
            Gender::Female => 'f',
        }
    }
}

/// Common behaviour of records stored in an entity table
pub trait Record: Clone + Default + Send + Sync + 'static {
    /// Kind tag used in errors and logs
    const KIND: EntityKind;

    fn id(&self) -> u32;

    fn is_valid(&self) -> bool;

    /// Flag the record as stored
    fn mark_valid(&mut self);

    /// Check field constraints
    fn validate(&self, limits: &Limits) -> Result<()>;
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(Error::validation(format!(
            "{} is too long (max {} chars)",
            field, max
        )));
    }
    Ok(())
}

fn check_window(field: &str, value: i64, window: Option<(i64, i64)>) -> Result<()> {
    match window {
        Some((lo, hi)) if value < lo || value > hi => Err(Error::validation(format!(
            "{} {} is outside [{}, {}]",
            field, value, lo, hi
        ))),
        _ => Ok(()),
    }
}

fn check_id(id: u32) -> Result<()> {
    if id == 0 {
        return Err(Error::validation("id should be non-zero"));
    }
    Ok(())
}

/// User profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    /// Unix seconds
    pub birth_date: i64,
    #[serde(skip)]
    pub valid: bool,
}

impl Record for User {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> u32 {
        self.id
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn mark_valid(&mut self) {
        self.valid = true;
    }

    fn validate(&self, limits: &Limits) -> Result<()> {
        check_id(self.id)?;
        check_len("email", &self.email, limits.email_len)?;
        check_len("first_name", &self.first_name, limits.name_len)?;
        check_len("last_name", &self.last_name, limits.name_len)?;
        check_window("birth_date", self.birth_date, limits.birth_date)
    }
}

/// Point of interest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: u32,
    pub place: String,
    pub country: String,
    pub city: String,
    /// Kilometers from the city
    pub distance: u32,
    #[serde(skip)]
    pub valid: bool,
}

impl Record for Location {
    const KIND: EntityKind = EntityKind::Location;

    fn id(&self) -> u32 {
        self.id
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn mark_valid(&mut self) {
        self.valid = true;
    }

    fn validate(&self, limits: &Limits) -> Result<()> {
        check_id(self.id)?;
        check_len("country", &self.country, limits.country_len)?;
        check_len("city", &self.city, limits.city_len)
    }
}

/// A user's visit to a location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: u32,
    pub location: u32,
    pub user: u32,
    /// Unix seconds
    pub visited_at: i64,
    pub mark: u8,
    #[serde(skip)]
    pub valid: bool,
}

impl Record for Visit {
    const KIND: EntityKind = EntityKind::Visit;

    fn id(&self) -> u32 {
        self.id
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn mark_valid(&mut self) {
        self.valid = true;
    }

    fn validate(&self, limits: &Limits) -> Result<()> {
        check_id(self.id)?;
        if self.mark > limits.max_mark {
            return Err(Error::validation(format!(
                "mark {} is outside [0, {}]",
                self.mark, limits.max_mark
            )));
        }
        check_window("visited_at", self.visited_at, limits.visited_at)
    }
}
