//! Cache counters and statistics reports
//!
//! Only raw counters are exposed. Derived figures such as hit rates are left
//! to whoever consumes the report.

use std::{
    fmt::Write as _,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of a [`CacheMetrics`] tracker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub promotions: u64,
    pub corruptions: u64,
    pub storage_errors: u64,
    pub computations: u64,
    pub compute_failures: u64,
    pub compute_time_ms: u64,
}

/// Thread-safe cache metrics tracker
///
/// Cloning shares the underlying counters.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
    expirations: Arc<AtomicU64>,
    promotions: Arc<AtomicU64>,
    corruptions: Arc<AtomicU64>,
    storage_errors: Arc<AtomicU64>,
    computations: Arc<AtomicU64>,
    compute_failures: Arc<AtomicU64>,
    compute_time_ms: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a value copied from the persistent tier into memory
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corruption(&self) {
        self.corruptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished computation with its duration
    pub fn record_computation(&self, elapsed_ms: f64, succeeded: bool) {
        self.computations.fetch_add(1, Ordering::Relaxed);
        self.compute_time_ms
            .fetch_add(elapsed_ms as u64, Ordering::Relaxed);
        if !succeeded {
            self.compute_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            corruptions: self.corruptions.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            compute_failures: self.compute_failures.load(Ordering::Relaxed),
            compute_time_ms: self.compute_time_ms.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.evictions,
            &self.expirations,
            &self.promotions,
            &self.corruptions,
            &self.storage_errors,
            &self.computations,
            &self.compute_failures,
            &self.compute_time_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Memory tier statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entry_count: usize,
    pub size_bytes: u64,
}

/// On-disk footprint of a persistent domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub entries: u64,
    pub bytes: u64,
}

/// Statistics for one cache domain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStats {
    pub domain: String,
    /// Lookups answered by either tier
    pub hits: u64,
    /// Lookups that found nothing usable in either tier
    pub misses: u64,
    /// Memory tier LRU evictions
    pub evictions: u64,
    /// Entries currently held in memory
    pub entry_count: usize,
    /// Approximate payload bytes held in memory
    pub approx_size_bytes: u64,
    pub promotions: u64,
    pub expirations: u64,
    pub corruptions: u64,
    pub storage_errors: u64,
    pub computations: u64,
    pub compute_failures: u64,
    pub persisted: bool,
    pub persisted_entries: Option<u64>,
    pub persisted_bytes: Option<u64>,
}

/// Per-domain statistics for the whole cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheReport {
    pub domains: Vec<DomainStats>,
}

impl CacheReport {
    pub fn domain(&self, name: &str) -> Option<&DomainStats> {
        self.domains.iter().find(|stats| stats.domain == name)
    }

    pub fn total_hits(&self) -> u64 {
        self.domains.iter().map(|stats| stats.hits).sum()
    }

    pub fn total_misses(&self) -> u64 {
        self.domains.iter().map(|stats| stats.misses).sum()
    }

    /// Storage and corruption events the cache absorbed silently
    pub fn absorbed_events(&self) -> u64 {
        self.domains
            .iter()
            .map(|stats| stats.storage_errors + stats.corruptions)
            .sum()
    }

    /// Get a formatted summary of the report
    pub fn summary(&self) -> String {
        let mut out = String::from("Cache Statistics:\n");
        for stats in &self.domains {
            let _ = writeln!(
                out,
                "  {}: hits={} misses={} evictions={} entries={} size={} bytes",
                stats.domain,
                stats.hits,
                stats.misses,
                stats.evictions,
                stats.entry_count,
                stats.approx_size_bytes
            );
            if let (Some(entries), Some(bytes)) = (stats.persisted_entries, stats.persisted_bytes) {
                let _ = writeln!(out, "    on disk: {} entries, {} bytes", entries, bytes);
            }
            if stats.storage_errors > 0 || stats.corruptions > 0 {
                let _ = writeln!(
                    out,
                    "    absorbed: {} storage errors, {} corrupted files",
                    stats.storage_errors, stats.corruptions
                );
            }
        }
        out
    }
}

/// Operation timing helper
#[derive(Debug)]
pub struct OperationTimer {
    start_time: std::time::Instant,
}

impl OperationTimer {
    /// Start timing an operation
    pub fn start() -> Self {
        Self {
            start_time: std::time::Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() * 1000.0
    }
}
