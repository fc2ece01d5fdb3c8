//! Traffic Stats Watcher
//!
//! Logs request throughput and cache effectiveness once per interval, then
//! resets the counters. Quiet intervals are skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use super::cache::CacheStats;
use super::router::Router;

/// Counters collected over one interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    pub requests: u64,
    pub cache: Option<CacheStats>,
}

impl StatsReport {
    /// Cache hits over lookups, when any lookup happened
    pub fn hit_rate(&self) -> Option<f64> {
        self.cache
            .filter(|c| c.lookups > 0)
            .map(|c| c.hits as f64 / c.lookups as f64)
    }
}

/// Drain the router's counters; `None` when there was no traffic
pub fn take_report(router: &Router) -> Option<StatsReport> {
    let requests = router.take_request_count();
    if requests == 0 {
        return None;
    }
    let cache = router.cache().map(|cache| {
        let stats = cache.stats();
        cache.reset_statistics();
        stats
    });
    Some(StatsReport { requests, cache })
}

/// Spawn the periodic stats logger
pub fn spawn_stats_watcher(router: Arc<Router>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(report) = take_report(&router) else {
                continue;
            };
            let per_second = report.requests as f64 / interval.as_secs_f64();
            match report.cache {
                Some(cache) => info!(
                    requests = report.requests,
                    rps = per_second,
                    cache_hits = cache.hits,
                    cache_lookups = cache.lookups,
                    cached_entries = cache.entries,
                    "traffic"
                ),
                None => info!(requests = report.requests, rps = per_second, "traffic"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RouterConfig;
    use crate::config::StoreConfig;
    use crate::store::Store;
    use hyper::Method;

    #[test]
    fn test_take_report_resets() {
        let store = Arc::new(Store::new(StoreConfig::default()).unwrap());
        let router = Router::new(store, RouterConfig::default());
        assert!(take_report(&router).is_none());

        router.handle(&Method::GET, "/users/1", b"");
        router.handle(&Method::GET, "/users/1", b"");

        let report = take_report(&router).unwrap();
        assert_eq!(report.requests, 2);
        let cache = report.cache.unwrap();
        assert_eq!(cache.lookups, 2);
        assert_eq!(cache.hits, 0);
        assert_eq!(report.hit_rate(), Some(0.0));

        assert!(take_report(&router).is_none());
        assert_eq!(router.cache().unwrap().lookup_count(), 0);
    }
}
