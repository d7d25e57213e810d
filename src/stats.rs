//! Gateway traffic counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Point-in-time copy of [`GatewayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Requests answered from the cache.
    pub hits: u64,
    /// Requests forwarded to the network after a lookup miss.
    pub misses: u64,
    /// Requests that skipped the cache entirely (non-GET).
    pub bypassed: u64,
    /// Network fetches that failed.
    pub network_errors: u64,
    /// Responses written to the cache after a miss.
    pub stored: u64,
    /// Cache writes that failed and were dropped.
    pub store_failures: u64,
    /// Bytes served from the cache.
    pub bytes_from_cache: u64,
    /// Bytes served from the network.
    pub bytes_from_network: u64,
    /// Seconds since the counters were created.
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    /// Fraction of lookups that hit, or `0.0` when nothing was looked up.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Lock-free counters shared by concurrent intercepts.
#[derive(Debug)]
pub struct GatewayStats {
    start_time: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
    bypassed: AtomicU64,
    network_errors: AtomicU64,
    stored: AtomicU64,
    store_failures: AtomicU64,
    bytes_from_cache: AtomicU64,
    bytes_from_network: AtomicU64,
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
            network_errors: AtomicU64::new(0),
            stored: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            bytes_from_cache: AtomicU64::new(0),
            bytes_from_network: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_hit(&self, bytes: usize) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.bytes_from_cache
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bypass(&self) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_network(&self, bytes: usize) {
        self.bytes_from_network
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_network_error(&self) {
        self.network_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store(&self, ok: bool) {
        if ok {
            self.stored.fetch_add(1, Ordering::Relaxed);
        } else {
            self.store_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns the elapsed time since the counters were created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Copies the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            network_errors: self.network_errors.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            bytes_from_cache: self.bytes_from_cache.load(Ordering::Relaxed),
            bytes_from_network: self.bytes_from_network.load(Ordering::Relaxed),
            uptime_secs: self.elapsed().as_secs(),
        }
    }
}
