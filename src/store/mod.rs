//! Storage Engine
//!
//! In-memory tables for users, locations and visits plus two denormalized
//! indexes derived from visits.
//!
//! # Architecture
//!
//! ```text
//! users ──────┐                         ┌──▶ LocationMarks[location]
//! locations ──┼── add/update visit ─────┤
//! visits ─────┘                         └──▶ UserVisits[user]
//! ```
//!
//! # Lock order
//!
//! Visit slot, then location slot, then user slot, then one bucket at a
//! time. Bucket map shards are leaves and are never held while another lock
//! is taken. No operation holds a lock across I/O.

mod bucket;
mod engine;
mod index;
mod proptest;
mod sharded_lock;
mod table;

pub use bucket::Bucket;
pub use engine::{Store, StoreStats};
pub use index::BucketIndex;
pub use sharded_lock::ShardedLock;
pub use table::{EntityTable, TableEntry, TableView};
