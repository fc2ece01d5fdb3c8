//! Travelstore - In-Memory Travel Data Store
//!
//! Users, locations and visits held in sharded in-memory tables, with two
//! denormalized indexes kept in step with every write:
//!
//! - **LocationMarks**: per location, one mark per visit carrying the
//!   visitor's birth date and gender
//! - **UserVisits**: per user, the visit history sorted by date, carrying the
//!   location's place, country and distance
//!
//! # Architecture
//!
//! ```text
//! HTTP (hyper) → Router → Store → EntityTable / BucketIndex
//!                  │
//!                  └─ ResponseCache
//! ```
//!
//! # Modules
//!
//! - [`api`] - Routing, response cache and HTTP server
//! - [`config`] - Store configuration and field limits
//! - [`error`] - Error types
//! - [`filter`] - Query filter compiler
//! - [`loader`] - Bulk loader
//! - [`model`] - Entities, index records and update payloads
//! - [`store`] - Storage engine

pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod model;
pub mod store;

pub use config::{Limits, StoreConfig};
pub use error::{Error, Result};
pub use store::Store;
