//! Data Model
//!
//! Primary entities (users, locations, visits), the denormalized records kept
//! in the visit indexes, and partial-update payloads.

mod entity;
mod index;
mod patch;

pub use entity::{EntityKind, Gender, Location, Record, User, Visit};
pub use index::{IndexRecord, LocationMark, UserVisit};
pub use patch::{LocationPatch, UserPatch, VisitPatch};
