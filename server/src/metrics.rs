//! Request and dependency counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Service metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Lookups answered from the cache.
    pub cache_hits: AtomicU64,
    /// Lookups that fell through to the store or provider.
    pub cache_misses: AtomicU64,
    /// Calls made to the rate provider.
    pub upstream_fetches: AtomicU64,
    /// Calls made to the forecast service.
    pub forecast_calls: AtomicU64,
    /// Cache write-backs or invalidations that failed and were only logged.
    pub best_effort_failures: AtomicU64,
    pub client_faults: AtomicU64,
    pub server_faults: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upstream_fetch(&self) {
        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn forecast_call(&self) {
        self.forecast_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn best_effort_failure(&self) {
        self.best_effort_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed request by fault class.
    pub fn request_failed(&self, client_fault: bool) {
        if client_fault {
            self.client_faults.fetch_add(1, Ordering::Relaxed);
        } else {
            self.server_faults.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            upstream_fetches: self.upstream_fetches.load(Ordering::Relaxed),
            forecast_calls: self.forecast_calls.load(Ordering::Relaxed),
            best_effort_failures: self.best_effort_failures.load(Ordering::Relaxed),
            client_faults: self.client_faults.load(Ordering::Relaxed),
            server_faults: self.server_faults.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub upstream_fetches: u64,
    pub forecast_calls: u64,
    pub best_effort_failures: u64,
    pub client_faults: u64,
    pub server_faults: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.cache_hit();
        metrics.cache_miss();
        metrics.cache_miss();
        metrics.request_failed(true);
        metrics.request_failed(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 2);
        assert_eq!(snapshot.client_faults, 1);
        assert_eq!(snapshot.server_faults, 1);
        assert_eq!(snapshot.upstream_fetches, 0);
    }

    #[test]
    fn test_snapshot_json() {
        let metrics = Metrics::new();
        metrics.forecast_call();

        let value = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(value["forecastCalls"], 1);
        assert_eq!(value["bestEffortFailures"], 0);
    }
}
