//! HTTP API
//!
//! Routes:
//!
//! - `GET /{users,locations,visits}/{id}`
//! - `GET /users/{id}/visits?fromDate&toDate&country&toDistance`
//! - `GET /locations/{id}/avg?fromDate&toDate&fromAge&toAge&gender`
//! - `GET /locations/{id}/marks`
//! - `POST /{entity}/new`, `POST /{entity}/{id}`
//!
//! Entity GET bodies are memoized in a [`ResponseCache`] and dropped on
//! update. POST replies are always `{}` and close the connection.

mod cache;
mod router;
mod server;
mod stats;

pub use cache::{entity_key, CacheStats, ResponseCache};
pub use router::{parse_query, Reply, Router, RouterConfig, CONTENT_TYPE};
pub use server::{serve, serve_listener};
pub use stats::{spawn_stats_watcher, take_report, StatsReport};
