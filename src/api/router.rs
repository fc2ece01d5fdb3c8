//! Request Router
//!
//! Maps `(method, path?query, body)` to store calls and renders the reply.
//! Transport-free, so the HTTP server and tests drive the same code.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use hyper::{Method, StatusCode};
use serde::Serialize;
use tracing::{debug, error};

use super::cache::{entity_key, ResponseCache};
use crate::error::{Error, Result};
use crate::filter::{MarkFilter, VisitFilter};
use crate::model::{
    EntityKind, Location, LocationMark, LocationPatch, Record, User, UserPatch, UserVisit, Visit,
    VisitPatch,
};
use crate::store::Store;

/// Content type of every reply
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Body of every POST reply
const POSTED: &[u8] = b"{}";

/// Router configuration
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Memoize entity GET responses
    pub cache_enabled: bool,
    /// Re-render written entities right after a successful POST
    pub heat: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            heat: false,
        }
    }
}

/// Rendered response
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Bytes,
    /// Close the connection after this reply
    pub close: bool,
}

impl Reply {
    fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
            close: false,
        }
    }

    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: Bytes::new(),
            close: false,
        }
    }

    fn posted(status: StatusCode) -> Self {
        Self {
            status,
            body: Bytes::from_static(POSTED),
            close: true,
        }
    }
}

#[derive(Serialize)]
struct VisitsBody<'a> {
    visits: &'a [UserVisit],
}

#[derive(Serialize)]
struct MarksBody<'a> {
    marks: &'a [LocationMark],
}

/// HTTP status for a failed store call
fn error_status(err: &Error) -> StatusCode {
    if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn parse_id(raw: &str) -> Option<u32> {
    raw.parse().ok()
}

fn decode(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|e| Error::InvalidFilter(format!("bad query encoding: {}", e)))
}

/// Split a query string into decoded parameters; later keys win
pub fn parse_query(query: &str) -> Result<HashMap<String, String>> {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(decode(key)?, decode(value)?);
    }
    Ok(params)
}

/// Serialized record, `None` when it is not stored
fn encode<T: Record + Serialize>(record: &T) -> Result<Option<Bytes>> {
    if !record.is_valid() {
        return Ok(None);
    }
    Ok(Some(Bytes::from(serde_json::to_vec(record)?)))
}

/// Request router over a shared store
pub struct Router {
    store: Arc<Store>,
    cache: Option<ResponseCache>,
    heat: bool,
    requests: AtomicU64,
}

impl Router {
    pub fn new(store: Arc<Store>, config: RouterConfig) -> Self {
        Self {
            store,
            cache: config.cache_enabled.then(ResponseCache::new),
            heat: config.heat,
            requests: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Response cache, when enabled
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Requests handled since the previous call
    pub fn take_request_count(&self) -> u64 {
        self.requests.swap(0, Ordering::Relaxed)
    }

    /// Handle one request. `target` is the path with its optional query.
    pub fn handle(&self, method: &Method, target: &str, body: &[u8]) -> Reply {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let segments: Vec<&str> = path.strip_prefix('/').unwrap_or(path).split('/').collect();

        match *method {
            Method::GET => self.route_get(&segments, query),
            Method::POST => Reply::posted(self.route_post(&segments, body)),
            _ => Reply::empty(StatusCode::METHOD_NOT_ALLOWED),
        }
    }

    fn route_get(&self, segments: &[&str], query: &str) -> Reply {
        match segments {
            [route, "new"] if EntityKind::from_route(route).is_some() => {
                Reply::empty(StatusCode::METHOD_NOT_ALLOWED)
            }
            [route, id] => match (EntityKind::from_route(route), parse_id(id)) {
                (Some(kind), Some(id)) => self.get_entity(kind, id),
                _ => Reply::empty(StatusCode::NOT_FOUND),
            },
            ["users", id, "visits"] => match parse_id(id) {
                Some(id) => self.get_user_visits(id, query),
                None => Reply::empty(StatusCode::NOT_FOUND),
            },
            ["locations", id, "avg"] => match parse_id(id) {
                Some(id) => self.get_location_avg(id, query),
                None => Reply::empty(StatusCode::NOT_FOUND),
            },
            ["locations", id, "marks"] => match parse_id(id) {
                Some(id) => self.get_location_marks(id),
                None => Reply::empty(StatusCode::NOT_FOUND),
            },
            _ => Reply::empty(StatusCode::NOT_FOUND),
        }
    }

    fn route_post(&self, segments: &[&str], body: &[u8]) -> StatusCode {
        let [route, target] = segments else {
            return StatusCode::NOT_FOUND;
        };
        let Some(kind) = EntityKind::from_route(route) else {
            return StatusCode::NOT_FOUND;
        };
        if *target == "new" {
            return self.create(kind, body);
        }
        match parse_id(target) {
            Some(id) => self.update(kind, id, body),
            None => StatusCode::NOT_FOUND,
        }
    }

    fn render_entity(&self, kind: EntityKind, id: u32) -> Result<Option<Bytes>> {
        match kind {
            EntityKind::User => encode(&self.store.get_user(id)),
            EntityKind::Location => encode(&self.store.get_location(id)),
            EntityKind::Visit => encode(&self.store.get_visit(id)),
        }
    }

    fn get_entity(&self, kind: EntityKind, id: u32) -> Reply {
        let key = entity_key(kind, id);
        if let Some(body) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            return Reply::ok(body);
        }

        let generation = self.cache.as_ref().map(|c| c.generation(&key));
        match self.render_entity(kind, id) {
            Ok(Some(body)) => {
                if let (Some(cache), Some(generation)) = (&self.cache, generation) {
                    cache.fill(&key, generation, body.clone());
                }
                Reply::ok(body)
            }
            Ok(None) => Reply::empty(StatusCode::NOT_FOUND),
            Err(e) => {
                error!(path = %key, error = %e, "failed to render entity");
                Reply::empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn get_user_visits(&self, id: u32, query: &str) -> Reply {
        if !self.store.has_user(id) {
            return Reply::empty(StatusCode::NOT_FOUND);
        }
        let filter = match parse_query(query).and_then(|params| VisitFilter::compile(&params)) {
            Ok(filter) => filter,
            Err(e) => {
                debug!(id, error = %e, "rejected visits filter");
                return Reply::empty(StatusCode::BAD_REQUEST);
            }
        };

        let visits = self.store.get_user_visits(id, &filter);
        self.json(&VisitsBody { visits: &visits })
    }

    fn get_location_avg(&self, id: u32, query: &str) -> Reply {
        if !self.store.has_location(id) {
            return Reply::empty(StatusCode::NOT_FOUND);
        }
        let filter = match parse_query(query).and_then(|params| MarkFilter::compile(&params)) {
            Ok(filter) => filter,
            Err(e) => {
                debug!(id, error = %e, "rejected marks filter");
                return Reply::empty(StatusCode::BAD_REQUEST);
            }
        };

        let avg = self.store.get_location_average_mark(id, &filter);
        Reply::ok(format!("{{\"avg\": {:.5}}}", avg))
    }

    fn get_location_marks(&self, id: u32) -> Reply {
        if !self.store.has_location(id) {
            return Reply::empty(StatusCode::NOT_FOUND);
        }
        let marks = self.store.get_location_marks(id);
        self.json(&MarksBody { marks: &marks })
    }

    fn json(&self, value: &impl Serialize) -> Reply {
        match serde_json::to_vec(value) {
            Ok(body) => Reply::ok(body),
            Err(e) => {
                error!(error = %e, "failed to serialize response");
                Reply::empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn create(&self, kind: EntityKind, body: &[u8]) -> StatusCode {
        let result = match kind {
            EntityKind::User => serde_json::from_slice::<User>(body)
                .map_err(Error::from)
                .and_then(|user| {
                    let id = user.id;
                    self.store.add_user(user).map(|_| id)
                }),
            EntityKind::Location => serde_json::from_slice::<Location>(body)
                .map_err(Error::from)
                .and_then(|location| {
                    let id = location.id;
                    self.store.add_location(location).map(|_| id)
                }),
            EntityKind::Visit => serde_json::from_slice::<Visit>(body)
                .map_err(Error::from)
                .and_then(|visit| {
                    let id = visit.id;
                    self.store.add_visit(visit).map(|_| id)
                }),
        };

        match result {
            Ok(id) => {
                // Fills the cache
                let _ = self.get_entity(kind, id);
                self.heat(kind, id);
                StatusCode::OK
            }
            Err(e) => {
                debug!(entity = %kind, error = %e, "insert rejected");
                error_status(&e)
            }
        }
    }

    fn update(&self, kind: EntityKind, id: u32, body: &[u8]) -> StatusCode {
        let exists = match kind {
            EntityKind::User => self.store.has_user(id),
            EntityKind::Location => self.store.has_location(id),
            EntityKind::Visit => self.store.has_visit(id),
        };
        if !exists {
            return StatusCode::NOT_FOUND;
        }

        let result = match kind {
            EntityKind::User => serde_json::from_slice::<UserPatch>(body)
                .map_err(Error::from)
                .and_then(|patch| self.store.patch_user(id, patch)),
            EntityKind::Location => serde_json::from_slice::<LocationPatch>(body)
                .map_err(Error::from)
                .and_then(|patch| self.store.patch_location(id, patch)),
            EntityKind::Visit => serde_json::from_slice::<VisitPatch>(body)
                .map_err(Error::from)
                .and_then(|patch| self.store.patch_visit(id, patch)),
        };

        match result {
            Ok(()) => {
                if let Some(cache) = &self.cache {
                    cache.invalidate(&entity_key(kind, id));
                }
                self.heat(kind, id);
                StatusCode::OK
            }
            Err(e) => {
                debug!(entity = %kind, id, error = %e, "update rejected");
                error_status(&e)
            }
        }
    }

    /// Re-render a freshly written entity and its derived listing
    fn heat(&self, kind: EntityKind, id: u32) {
        if !self.heat {
            return;
        }

        let check = |path: String, reply: Reply| {
            if reply.status != StatusCode::OK {
                error!(path = %path, status = %reply.status, "heat: non-200 response");
            }
        };

        check(entity_key(kind, id), self.get_entity(kind, id));
        match kind {
            EntityKind::User => check(format!("/users/{}/visits", id), self.get_user_visits(id, "")),
            EntityKind::Location => {
                check(format!("/locations/{}/avg", id), self.get_location_avg(id, ""))
            }
            EntityKind::Visit => {}
        }
    }
}
