//! Bounded in-process cache tier with LRU eviction and TTL expiry

use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    entry::{CacheEntry, Lookup},
    metrics::{CacheMetrics, MemoryStats},
};

struct Inner {
    entries: LruCache<String, CacheEntry>,
    size_bytes: u64,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

/// In-memory cache tier
///
/// The map and its recency order live behind a single mutex; every
/// operation holds it for one short, non-async critical section.
pub struct MemoryTier {
    inner: Mutex<Inner>,
    max_entries: usize,
    max_bytes: Option<u64>,
    metrics: CacheMetrics,
}

impl MemoryTier {
    /// Create a tier holding at most `max_entries` entries (minimum one)
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                size_bytes: 0,
            }),
            max_entries: max_entries.max(1),
            max_bytes: None,
            metrics: CacheMetrics::new(),
        }
    }

    /// Also bound the tier by total payload bytes
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Look up a live entry, refreshing its recency.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Lookup<CacheEntry> {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.touch();
                self.metrics.record_hit();
                return Lookup::Hit(entry.clone());
            }
            Some(_) => {}
            None => {
                self.metrics.record_miss();
                return Lookup::Miss;
            }
        }

        inner.remove(key);
        self.metrics.record_expiration();
        self.metrics.record_miss();
        debug!("Memory tier entry expired: {}", key);
        Lookup::Miss
    }

    /// Insert or overwrite a value, evicting LRU entries if over capacity
    pub fn put(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> usize {
        self.insert(CacheEntry::new(key, value, ttl))
    }

    /// Insert an existing entry, keeping its creation time and TTL.
    ///
    /// Returns the number of entries evicted to make room.
    pub fn insert(&self, mut entry: CacheEntry) -> usize {
        entry.last_access_at = Utc::now();
        let key = entry.key.clone();

        let mut inner = self.inner.lock();
        inner.size_bytes += entry.size_bytes;
        if let Some(previous) = inner.entries.put(key, entry) {
            inner.size_bytes = inner.size_bytes.saturating_sub(previous.size_bytes);
        }

        let mut evicted = 0;
        while inner.entries.len() > self.max_entries
            || self.max_bytes.map_or(false, |max| inner.size_bytes > max)
        {
            let Some((evicted_key, entry)) = inner.entries.pop_lru() else {
                break;
            };
            inner.size_bytes = inner.size_bytes.saturating_sub(entry.size_bytes);
            evicted += 1;
            debug!("Evicted least recently used entry: {}", evicted_key);
        }

        if evicted > 0 {
            self.metrics.record_evictions(evicted as u64);
        }
        evicted
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Remove a key, returning whether it was present
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Remove every key matching `predicate`
    pub fn delete_where(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, _)| predicate(key.as_str()))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            inner.remove(key);
        }
        doomed.len()
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
            self.metrics.record_expiration();
        }
        expired.len()
    }

    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.size_bytes = 0;
        count
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> u64 {
        self.inner.lock().size_bytes
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn stats(&self) -> MemoryStats {
        let counters = self.metrics.snapshot();
        let inner = self.inner.lock();
        MemoryStats {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            expirations: counters.expirations,
            entry_count: inner.entries.len(),
            size_bytes: inner.size_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_tier_basic_operations() {
        let tier = MemoryTier::new(10);

        tier.put("a", json!({"name": "Dm4"}), None);
        let entry = tier.get("a").into_hit().unwrap();
        assert_eq!(entry.payload, json!({"name": "Dm4"}));
        assert_eq!(entry.access_count, 1);

        assert!(tier.contains("a"));
        assert!(tier.delete("a"));
        assert!(!tier.delete("a"));
        assert_eq!(tier.get("a"), Lookup::Miss);

        let stats = tier.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.size_bytes, 0);
    }

    #[test]
    fn test_overwrite_replaces_value_and_size() {
        let tier = MemoryTier::new(10);
        tier.put("a", json!("short"), None);
        tier.put("a", json!("a much longer value"), None);

        assert_eq!(tier.len(), 1);
        assert_eq!(tier.get("a").into_hit().unwrap().payload, json!("a much longer value"));
        assert_eq!(tier.size_bytes(), "\"a much longer value\"".len() as u64);
    }

    #[test]
    fn test_lru_eviction_order() {
        let tier = MemoryTier::new(3);
        tier.put("a", json!(1), None);
        tier.put("b", json!(2), None);
        tier.put("c", json!(3), None);

        // Reading "a" makes "b" the least recently used.
        assert!(tier.get("a").is_hit());
        assert_eq!(tier.put("d", json!(4), None), 1);

        assert_eq!(tier.len(), 3);
        assert!(!tier.contains("b"));
        assert!(tier.contains("a"));
        assert!(tier.contains("c"));
        assert!(tier.contains("d"));
        assert_eq!(tier.stats().evictions, 1);
        assert_eq!(tier.keys(), vec!["d", "a", "c"]);
    }

    #[test]
    fn test_untouched_entries_evict_in_insertion_order() {
        let tier = MemoryTier::new(2);
        tier.put("first", json!(1), None);
        tier.put("second", json!(2), None);
        tier.put("third", json!(3), None);

        assert!(!tier.contains("first"));
        assert!(tier.contains("second"));
        assert!(tier.contains("third"));
    }

    #[test]
    fn test_byte_capacity() {
        let tier = MemoryTier::new(100).with_max_bytes(10);
        tier.put("a", json!("xxxx"), None); // 6 bytes
        tier.put("b", json!("yyyy"), None); // 6 bytes, pushes total to 12

        assert!(!tier.contains("a"));
        assert!(tier.contains("b"));
        assert!(tier.size_bytes() <= 10);
    }

    #[test]
    fn test_expired_entry_is_miss_and_purged() {
        let tier = MemoryTier::new(10);
        tier.put("a", json!("v"), Some(Duration::from_millis(20)));
        assert!(tier.get("a").is_hit());

        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(tier.get("a"), Lookup::Miss);
        assert!(!tier.contains("a"));
        assert_eq!(tier.size_bytes(), 0);
        assert_eq!(tier.stats().expirations, 1);
    }

    #[test]
    fn test_promoted_entry_keeps_original_expiry() {
        let tier = MemoryTier::new(10);
        let entry = CacheEntry::new("old", json!(1), Some(Duration::from_secs(60)))
            .with_created_at(Utc::now() - chrono::Duration::seconds(120));
        tier.insert(entry);

        assert_eq!(tier.get("old"), Lookup::Miss);
    }

    #[test]
    fn test_purge_delete_where_and_clear() {
        let tier = MemoryTier::new(10);
        tier.put("n:Dm4:left", json!(1), None);
        tier.put("n:Dm4:right", json!(2), None);
        tier.put("n:T4a", json!(3), Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(tier.purge_expired(), 1);
        assert_eq!(tier.delete_where(|key| key.starts_with("n:Dm4")), 2);
        assert!(tier.is_empty());

        tier.put("x", json!(0), None);
        assert_eq!(tier.clear(), 1);
        assert_eq!(tier.size_bytes(), 0);
    }
}
