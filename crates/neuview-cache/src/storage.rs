//! Second-tier storage seam
//!
//! [`CompositeCache`](crate::CompositeCache) talks to its persistent tier
//! only through this trait, so a different backend (or an instrumented one
//! in tests) can stand in for [`PersistentTier`](crate::PersistentTier).

use async_trait::async_trait;

use crate::{
    entry::{CacheEntry, Lookup},
    error::Result,
    metrics::{DiskUsage, MetricsSnapshot},
};

/// Cache storage backend for one domain
///
/// Read paths never fail: I/O problems degrade to `Miss`, damaged records
/// to `Corrupted`. Only `put` reports failures, and callers are expected to
/// log and drop them.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Domain this storage holds
    fn domain(&self) -> &str;

    /// Retrieve a live entry; expired entries are purged and reported as a miss
    async fn get(&self, key: &str) -> Lookup<CacheEntry>;

    /// Store an entry
    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Remove an entry; removing a missing key is not an error
    async fn delete(&self, key: &str) -> bool;

    /// Keys of every readable entry
    async fn keys(&self) -> Vec<String>;

    /// Remove expired entries, returning how many were removed
    async fn clean(&self) -> usize;

    /// Remove every entry, returning how many were removed
    async fn clear(&self) -> usize;

    /// Current footprint
    async fn usage(&self) -> DiskUsage;

    /// Counters for absorbed events
    fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::default()
    }
}
