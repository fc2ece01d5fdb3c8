//! Bulk Loader
//!
//! Fills a store from a directory of JSON files, each shaped like
//! `{"users": [...]}`, `{"locations": [...]}` or `{"visits": [...]}` (any
//! combination of the three sections).
//!
//! Loading runs in two stages. Stage 1 parses every file in parallel and
//! inserts users and locations. Stage 2 inserts the visits, whose references
//! are only guaranteed to resolve once stage 1 is complete.

use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{Location, User, Visit};
use crate::store::Store;

/// Outcome of a load
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadSummary {
    pub users: usize,
    pub locations: usize,
    pub visits: usize,
    /// Records the store refused
    pub rejected: usize,
    pub elapsed: Duration,
}

impl AddAssign for LoadSummary {
    fn add_assign(&mut self, other: Self) {
        self.users += other.users;
        self.locations += other.locations;
        self.visits += other.visits;
        self.rejected += other.rejected;
    }
}

/// One data file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DataFile {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    locations: Vec<Location>,
    #[serde(default)]
    visits: Vec<Visit>,
}

/// Count an insert outcome, logging refusals
fn tally(summary: &mut LoadSummary, file: &Path, kind: &str, id: u32, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(file = %file.display(), kind, id, error = %e, "record rejected");
            summary.rejected += 1;
            false
        }
    }
}

/// Stage 1 for one file: parse it, insert users and locations, hand back the visits
fn load_entities(store: &Store, path: &Path) -> Result<(LoadSummary, Vec<Visit>)> {
    let raw = std::fs::read(path)?;
    let data: DataFile = serde_json::from_slice(&raw).map_err(|e| {
        Error::Internal(format!("{}: malformed data file: {}", path.display(), e))
    })?;
    debug!(
        file = %path.display(),
        users = data.users.len(),
        locations = data.locations.len(),
        visits = data.visits.len(),
        "parsed data file"
    );

    let mut summary = LoadSummary::default();
    for user in data.users {
        let id = user.id;
        if tally(&mut summary, path, "user", id, store.add_user(user)) {
            summary.users += 1;
        }
    }
    for location in data.locations {
        let id = location.id;
        if tally(&mut summary, path, "location", id, store.add_location(location)) {
            summary.locations += 1;
        }
    }
    Ok((summary, data.visits))
}

/// Stage 2 for one file
fn load_visits(store: &Store, path: &Path, visits: Vec<Visit>) -> LoadSummary {
    let mut summary = LoadSummary::default();
    for visit in visits {
        let id = visit.id;
        if tally(&mut summary, path, "visit", id, store.add_visit(visit)) {
            summary.visits += 1;
        }
    }
    summary
}

/// `*.json` files of `dir`, sorted by name
async fn data_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn run_blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> Result<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("loader task failed: {}", e)))
}

/// Load every data file of `dir` into `store`.
///
/// A file that cannot be read or parsed aborts the load. Individual records
/// the store refuses are counted in [`LoadSummary::rejected`].
pub async fn load_dir(store: Arc<Store>, dir: impl AsRef<Path>) -> Result<LoadSummary> {
    let dir = dir.as_ref();
    let started = Instant::now();
    let files = data_files(dir).await?;
    info!(dir = %dir.display(), files = files.len(), "loader: starting");

    // Stage 1: users and locations
    let stage1 = files.iter().cloned().map(|path| {
        let store = Arc::clone(&store);
        run_blocking(move || load_entities(&store, &path).map(|loaded| (path, loaded)))
    });
    let mut summary = LoadSummary::default();
    let mut pending = Vec::with_capacity(files.len());
    for result in join_all(stage1).await {
        let (path, (loaded, visits)) = result??;
        summary += loaded;
        pending.push((path, visits));
    }
    info!(
        users = summary.users,
        locations = summary.locations,
        elapsed = ?started.elapsed(),
        "loader: stage 1 finished"
    );

    // Stage 2: visits
    let stage2 = pending.into_iter().map(|(path, visits)| {
        let store = Arc::clone(&store);
        run_blocking(move || load_visits(&store, &path, visits))
    });
    for result in join_all(stage2).await {
        summary += result?;
    }

    summary.elapsed = started.elapsed();
    info!(
        users = summary.users,
        locations = summary.locations,
        visits = summary.visits,
        rejected = summary.rejected,
        elapsed = ?summary.elapsed,
        "loader: finished"
    );
    Ok(summary)
}
