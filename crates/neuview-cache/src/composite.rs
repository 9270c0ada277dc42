//! Two-tier cache: memory (L1) in front of persistent storage (L2)

use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
    entry::{CacheEntry, Lookup},
    error::{CacheError, Result},
    memory::MemoryTier,
    metrics::{CacheMetrics, MetricsSnapshot},
    storage::CacheStorage,
};

/// Memory tier with an optional persistent tier behind it
///
/// Lookups fall through L1 to L2 and promote L2 hits into L1. Writes always
/// land in L1 and, when a persistent tier is attached, are written through
/// to it; an L2 failure never fails the write.
pub struct CompositeCache {
    domain: String,
    memory: MemoryTier,
    persistent: Option<Arc<dyn CacheStorage>>,
    metrics: CacheMetrics,
}

impl CompositeCache {
    /// Memory-only cache
    pub fn new(domain: impl Into<String>, memory: MemoryTier) -> Self {
        Self {
            domain: domain.into(),
            memory,
            persistent: None,
            metrics: CacheMetrics::new(),
        }
    }

    pub fn builder(domain: impl Into<String>) -> CompositeCacheBuilder {
        CompositeCacheBuilder::new(domain)
    }

    /// Attach a persistent tier
    pub fn with_persistent(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.persistent = Some(storage);
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    pub fn persistent(&self) -> Option<&Arc<dyn CacheStorage>> {
        self.persistent.as_ref()
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.is_some()
    }

    /// Look up `key`, promoting an L2 hit into L1
    pub async fn get(&self, key: &str) -> Lookup<CacheEntry> {
        if let Lookup::Hit(entry) = self.memory.get(key) {
            self.metrics.record_hit();
            return Lookup::Hit(entry);
        }

        let Some(persistent) = &self.persistent else {
            self.metrics.record_miss();
            return Lookup::Miss;
        };

        match persistent.get(key).await {
            Lookup::Hit(mut entry) => {
                self.memory.insert(entry.clone());
                entry.touch();
                self.metrics.record_hit();
                self.metrics.record_promotion();
                debug!("Promoted {} from disk into memory", key);
                Lookup::Hit(entry)
            }
            Lookup::Miss => {
                self.metrics.record_miss();
                Lookup::Miss
            }
            Lookup::Corrupted => {
                self.metrics.record_miss();
                Lookup::Corrupted
            }
        }
    }

    /// Store a value in memory and, for persisted domains, on disk
    pub async fn put(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> CacheEntry {
        let entry = CacheEntry::new(key, value, ttl);
        self.store(entry.clone()).await;
        entry
    }

    /// Store a prepared entry in both tiers
    pub async fn store(&self, entry: CacheEntry) {
        if let Some(persistent) = &self.persistent {
            if let Err(err) = persistent.put(&entry).await {
                warn!("Entry {} kept in memory only: {}", entry.key, err);
            }
        }
        self.memory.insert(entry);
    }

    /// Remove `key` from both tiers
    pub async fn invalidate(&self, key: &str) -> bool {
        let in_memory = self.memory.delete(key);
        let on_disk = match &self.persistent {
            Some(persistent) => persistent.delete(key).await,
            None => false,
        };
        in_memory || on_disk
    }

    /// Remove every key matching `predicate` from both tiers.
    ///
    /// Returns the number of distinct keys removed.
    pub async fn invalidate_matching<P>(&self, predicate: P) -> usize
    where
        P: Fn(&str) -> bool + Send + Sync,
    {
        let mut removed = self.memory.keys();
        removed.retain(|key| predicate(key.as_str()));
        self.memory.delete_where(&predicate);

        if let Some(persistent) = &self.persistent {
            for key in persistent.keys().await {
                if predicate(key.as_str()) && persistent.delete(&key).await && !removed.contains(&key) {
                    removed.push(key);
                }
            }
        }
        removed.len()
    }

    /// Drop expired entries from both tiers.
    ///
    /// Returns the number of files removed from the persistent tier.
    pub async fn clean(&self) -> usize {
        self.memory.purge_expired();
        match &self.persistent {
            Some(persistent) => persistent.clean().await,
            None => 0,
        }
    }

    /// Empty both tiers, returning the larger of the two entry counts
    pub async fn clear(&self) -> usize {
        let in_memory = self.memory.clear();
        let on_disk = match &self.persistent {
            Some(persistent) => persistent.clear().await,
            None => 0,
        };
        in_memory.max(on_disk)
    }

    /// Hits, misses and promotions seen through this cache
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Builder pattern for composite cache construction
pub struct CompositeCacheBuilder {
    domain: String,
    max_entries: usize,
    max_bytes: Option<u64>,
    persistent: Option<Arc<dyn CacheStorage>>,
}

impl CompositeCacheBuilder {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            max_entries: 1000,
            max_bytes: None,
            persistent: None,
        }
    }

    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set persistent storage
    pub fn persistent(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.persistent = Some(storage);
        self
    }

    pub fn build(self) -> Result<CompositeCache> {
        if self.max_entries == 0 {
            return Err(CacheError::invalid_config(
                "max_entries",
                "must be greater than zero",
            ));
        }

        let mut memory = MemoryTier::new(self.max_entries);
        if let Some(max_bytes) = self.max_bytes {
            memory = memory.with_max_bytes(max_bytes);
        }

        let mut cache = CompositeCache::new(self.domain, memory);
        if let Some(persistent) = self.persistent {
            cache = cache.with_persistent(persistent);
        }
        Ok(cache)
    }
}
