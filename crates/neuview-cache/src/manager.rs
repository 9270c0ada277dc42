//! Cache facade used by the rest of the application
//!
//! A `CacheManager` is built once per process from [`CacheSettings`] and
//! handed to whatever needs caching. It owns one [`CompositeCache`] and one
//! [`InFlightTracker`] per configured domain.

use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::{
    composite::CompositeCache,
    config::CacheSettings,
    domain::CacheDomain,
    entry::{CacheEntry, Lookup},
    error::{CacheError, Result},
    inflight::{InFlightTracker, Outcome},
    key::{CacheKeyScheme, KeyParts},
    metrics::{CacheMetrics, CacheReport, DomainStats, OperationTimer},
    persistent::PersistentTier,
};

/// Lifetime requested for a cached value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the domain's configured TTL
    #[default]
    DomainDefault,
    /// Never expire by time
    Never,
    /// Expire after the given duration
    After(Duration),
}

impl Ttl {
    fn resolve(self, domain: &CacheDomain) -> Result<Option<Duration>> {
        match self {
            Ttl::DomainDefault => Ok(domain.default_ttl()),
            Ttl::Never => Ok(None),
            Ttl::After(ttl) if ttl.is_zero() => Err(CacheError::InvalidTtl {
                message: "TTL must be greater than zero".to_string(),
            }),
            Ttl::After(ttl) => Ok(Some(ttl)),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        Ttl::After(ttl)
    }
}

/// What to remove in [`CacheManager::invalidate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// One key in one domain
    Key { domain: String, parts: KeyParts },
    /// Every key whose discriminator starts with `parts`, in one domain or
    /// in all of them
    Prefix {
        domain: Option<String>,
        parts: KeyParts,
    },
    /// Everything in one domain
    Domain(String),
    /// Everything
    All,
}

impl Invalidation {
    pub fn key(domain: impl Into<String>, parts: impl Into<KeyParts>) -> Self {
        Self::Key {
            domain: domain.into(),
            parts: parts.into(),
        }
    }

    pub fn prefix(domain: impl Into<String>, parts: impl Into<KeyParts>) -> Self {
        Self::Prefix {
            domain: Some(domain.into()),
            parts: parts.into(),
        }
    }

    /// Everything cached about one entity, across all domains
    pub fn entity(parts: impl Into<KeyParts>) -> Self {
        Self::Prefix {
            domain: None,
            parts: parts.into(),
        }
    }
}

struct DomainCache {
    domain: CacheDomain,
    cache: Arc<CompositeCache>,
    inflight: InFlightTracker,
    metrics: CacheMetrics,
}

/// Multi-domain cache manager
pub struct CacheManager {
    cache_root: PathBuf,
    key_scheme: CacheKeyScheme,
    domains: BTreeMap<String, DomainCache>,
}

impl CacheManager {
    /// Build a manager for every domain in `settings`.
    ///
    /// Nothing is written to disk here; persisted domains create their
    /// directories on first write.
    pub fn new(settings: CacheSettings, key_scheme: CacheKeyScheme) -> Result<Self> {
        settings.validate()?;

        let mut domains = BTreeMap::new();
        for (name, domain_settings) in &settings.domains {
            let domain = CacheDomain::new(name.as_str(), domain_settings, &settings.memory)?;

            let mut builder = CompositeCache::builder(name.as_str())
                .max_entries(domain.max_entries())
                .max_bytes(domain.max_bytes());
            if domain.persist() {
                builder = builder.persistent(Arc::new(PersistentTier::for_domain(&settings.cache_root, &domain)));
            }

            domains.insert(
                name.clone(),
                DomainCache {
                    cache: Arc::new(builder.build()?),
                    domain,
                    inflight: InFlightTracker::new(),
                    metrics: CacheMetrics::new(),
                },
            );
        }

        info!(
            "Cache manager ready with {} domains under {}",
            domains.len(),
            settings.cache_root.display()
        );

        Ok(Self {
            cache_root: settings.cache_root,
            key_scheme,
            domains,
        })
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn key_scheme(&self) -> &CacheKeyScheme {
        &self.key_scheme
    }

    /// Configured domains, in name order
    pub fn domains(&self) -> impl Iterator<Item = &CacheDomain> {
        self.domains.values().map(|slot| &slot.domain)
    }

    pub fn domain(&self, name: &str) -> Result<&CacheDomain> {
        self.slot(name).map(|slot| &slot.domain)
    }

    fn slot(&self, name: &str) -> Result<&DomainCache> {
        self.domains.get(name).ok_or_else(|| CacheError::UnknownDomain {
            domain: name.to_string(),
        })
    }

    /// Return the cached value for `parts`, computing and caching it on a miss.
    ///
    /// Concurrent calls for the same missing key share a single run of
    /// `compute`. A failed computation is returned to every caller waiting
    /// on it and is not cached.
    pub async fn get_or_compute<T, F, Fut, E>(
        &self,
        domain: &str,
        parts: impl Into<KeyParts>,
        ttl: Ttl,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let slot = self.slot(domain)?;
        let ttl = ttl.resolve(&slot.domain)?;
        let key = self.key_scheme.key(domain, &parts.into())?;

        if let Some(value) = self.lookup(slot, &key).await {
            return Ok(value);
        }

        let cache = slot.cache.clone();
        let metrics = slot.metrics.clone();
        let populate_key = key.clone();
        let payload = slot
            .inflight
            .run(&key, move || populate(cache, metrics, populate_key, ttl, compute))
            .await?;

        serde_json::from_value(payload).map_err(|e| CacheError::Serialization {
            message: e.to_string(),
        })
    }

    /// [`get_or_compute`](Self::get_or_compute) with a caller-local deadline.
    ///
    /// Timing out abandons only this caller's wait; the computation keeps
    /// running and its result is still cached.
    pub async fn get_or_compute_with_timeout<T, F, Fut, E>(
        &self,
        domain: &str,
        parts: impl Into<KeyParts>,
        ttl: Ttl,
        timeout: Duration,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        tokio::time::timeout(timeout, self.get_or_compute(domain, parts, ttl, compute))
            .await
            .map_err(|_| CacheError::Timeout(timeout))?
    }

    /// Cached value for `parts`, if any
    pub async fn get<T: DeserializeOwned>(&self, domain: &str, parts: impl Into<KeyParts>) -> Result<Option<T>> {
        let slot = self.slot(domain)?;
        let key = self.key_scheme.key(domain, &parts.into())?;
        Ok(self.lookup(slot, &key).await)
    }

    /// Store a value directly, bypassing computation
    pub async fn put<T: Serialize>(
        &self,
        domain: &str,
        parts: impl Into<KeyParts>,
        value: &T,
        ttl: Ttl,
    ) -> Result<()> {
        let slot = self.slot(domain)?;
        let ttl = ttl.resolve(&slot.domain)?;
        let key = self.key_scheme.key(domain, &parts.into())?;
        let payload = serde_json::to_value(value).map_err(|e| CacheError::Serialization {
            message: e.to_string(),
        })?;

        slot.cache.put(&key, payload, ttl).await;
        Ok(())
    }

    async fn lookup<T: DeserializeOwned>(&self, slot: &DomainCache, key: &str) -> Option<T> {
        match slot.cache.get(key).await {
            Lookup::Hit(entry) => match serde_json::from_value(entry.payload) {
                Ok(value) => {
                    slot.metrics.record_hit();
                    debug!("Cache hit: {}", key);
                    Some(value)
                }
                Err(e) => {
                    // Stale shape from an older build; drop it and recompute.
                    warn!("Cached value for {} does not match its type: {}", key, e);
                    slot.cache.invalidate(key).await;
                    slot.metrics.record_corruption();
                    slot.metrics.record_miss();
                    None
                }
            },
            Lookup::Miss | Lookup::Corrupted => {
                slot.metrics.record_miss();
                debug!("Cache miss: {}", key);
                None
            }
        }
    }

    /// Remove cached values, returning how many keys were removed
    pub async fn invalidate(&self, target: Invalidation) -> Result<usize> {
        let removed = match &target {
            Invalidation::Key { domain, parts } => {
                let slot = self.slot(domain)?;
                let key = self.key_scheme.key(domain, parts)?;
                usize::from(slot.cache.invalidate(&key).await)
            }
            Invalidation::Prefix { domain, parts } => {
                let slots: Vec<(&String, &DomainCache)> = match domain {
                    Some(name) => vec![(name, self.slot(name)?)],
                    None => self.domains.iter().collect(),
                };

                let mut removed = 0;
                for (name, slot) in slots {
                    let prefix = self.key_scheme.prefix(name, parts)?;
                    removed += slot
                        .cache
                        .invalidate_matching(|key| prefix.matches(key))
                        .await;
                }
                removed
            }
            Invalidation::Domain(name) => self.slot(name)?.cache.clear().await,
            Invalidation::All => self.clear().await,
        };

        info!("Invalidated {} cache entries ({:?})", removed, target);
        Ok(removed)
    }

    /// Per-domain statistics
    pub async fn stats(&self) -> CacheReport {
        let mut report = CacheReport::default();
        for (name, slot) in &self.domains {
            let manager = slot.metrics.snapshot();
            let composite = slot.cache.metrics();
            let memory = slot.cache.memory().stats();

            let mut stats = DomainStats {
                domain: name.clone(),
                hits: manager.hits,
                misses: manager.misses,
                evictions: memory.evictions,
                entry_count: memory.entry_count,
                approx_size_bytes: memory.size_bytes,
                promotions: composite.promotions,
                expirations: memory.expirations,
                corruptions: manager.corruptions,
                storage_errors: 0,
                computations: manager.computations,
                compute_failures: manager.compute_failures,
                persisted: slot.domain.persist(),
                persisted_entries: None,
                persisted_bytes: None,
            };

            if let Some(persistent) = slot.cache.persistent() {
                let disk = persistent.metrics();
                let usage = persistent.usage().await;
                stats.expirations += disk.expirations;
                stats.corruptions += disk.corruptions;
                stats.storage_errors += disk.storage_errors;
                stats.persisted_entries = Some(usage.entries);
                stats.persisted_bytes = Some(usage.bytes);
            }

            report.domains.push(stats);
        }
        report
    }

    /// Remove expired entries from every domain.
    ///
    /// Returns the number of persisted entries removed.
    pub async fn clean_expired(&self) -> usize {
        let mut removed = 0;
        for slot in self.domains.values() {
            removed += slot.cache.clean().await;
        }
        info!("Cleaned {} expired cache entries", removed);
        removed
    }

    /// Empty every domain
    pub async fn clear(&self) -> usize {
        let mut removed = 0;
        for slot in self.domains.values() {
            removed += slot.cache.clear().await;
        }
        removed
    }

    /// Check that the cache root can be created and written
    pub async fn check_root(&self) -> Result<()> {
        if !self.domains.values().any(|slot| slot.domain.persist()) {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.cache_root)
            .await
            .map_err(|e| CacheError::storage(&self.cache_root, e))?;

        let probe = self
            .cache_root
            .join(format!(".probe-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&probe, b"")
            .await
            .map_err(|e| CacheError::storage(&probe, e))?;
        let _ = tokio::fs::remove_file(&probe).await;
        Ok(())
    }

    /// Wait for every running computation to finish and be stored.
    ///
    /// Call before process exit so abandoned computations still reach disk.
    pub async fn flush(&self) {
        for slot in self.domains.values() {
            slot.inflight.wait_idle().await;
        }
    }

    /// Number of computations currently running
    pub fn pending(&self) -> usize {
        self.domains.values().map(|slot| slot.inflight.pending()).sum()
    }
}

/// Body of a population run by the leader for `key`
async fn populate<T, F, Fut, E>(
    cache: Arc<CompositeCache>,
    metrics: CacheMetrics,
    key: String,
    ttl: Option<Duration>,
    compute: F,
) -> Outcome
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<anyhow::Error>,
{
    // A previous leader may have finished between our miss and this
    // population starting.
    if let Lookup::Hit(entry) = cache.get(&key).await {
        return Ok(entry.payload);
    }

    let timer = OperationTimer::start();
    let computed = compute().await;
    metrics.record_computation(timer.elapsed_ms(), computed.is_ok());

    let value = match computed {
        Ok(value) => value,
        Err(e) => {
            let err: anyhow::Error = e.into();
            warn!("Computation for {} failed: {:#}", key, err);
            return Err(CacheError::Compute(Arc::new(err)));
        }
    };
    let payload = serde_json::to_value(&value).map_err(|e| CacheError::Serialization {
        message: e.to_string(),
    })?;

    cache
        .store(CacheEntry::new(key.as_str(), payload.clone(), ttl))
        .await;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::join_all;
    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        config::DomainSettings,
        domain::{COLUMNS, META, NEURON_DATA, ROI_HIERARCHY, SOMA_SIDES},
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct NeuronSummary {
        name: String,
        side: String,
        cells: u32,
    }

    fn manager(temp_dir: &TempDir) -> CacheManager {
        let scheme = CacheKeyScheme::new("neuprint.janelia.org", "optic-lobe:v1.0").unwrap();
        CacheManager::new(CacheSettings::new(temp_dir.path()), scheme).unwrap()
    }

    fn dm4() -> NeuronSummary {
        NeuronSummary {
            name: "Dm4".to_string(),
            side: "left".to_string(),
            cells: 31,
        }
    }

    #[tokio::test]
    async fn test_get_or_compute_caches_result() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value: NeuronSummary = manager
                .get_or_compute(NEURON_DATA, ("Dm4", "left"), Ttl::DomainDefault, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(dm4())
                })
                .await
                .unwrap();
            assert_eq!(value, dm4());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = manager.stats().await;
        let neuron = stats.domain(NEURON_DATA).unwrap();
        assert_eq!(neuron.hits, 2);
        assert_eq!(neuron.misses, 1);
        assert_eq!(neuron.computations, 1);
        assert_eq!(neuron.entry_count, 1);
        assert_eq!(neuron.persisted_entries, Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_callers_compute_once() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..25).map(|_| {
            let calls = calls.clone();
            manager.get_or_compute(NEURON_DATA, "T4a", Ttl::DomainDefault, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, anyhow::Error>(vec![1u32, 2, 3])
            })
        });

        for result in join_all(callers).await {
            assert_eq!(result.unwrap(), vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_computation_is_not_cached() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        let callers = (0..10).map(|_| {
            manager.get_or_compute(ROI_HIERARCHY, "", Ttl::DomainDefault, || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err::<String, _>(anyhow::anyhow!("connection reset"))
            })
        });
        for result in join_all(callers).await {
            let err = result.unwrap_err();
            assert!(err.is_compute());
            assert!(err.to_string().contains("connection reset"));
        }

        let value: String = manager
            .get_or_compute(ROI_HIERARCHY, "", Ttl::DomainDefault, || async {
                Ok::<_, anyhow::Error>("hierarchy".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "hierarchy");

        let stats = manager.stats().await;
        assert_eq!(stats.domain(ROI_HIERARCHY).unwrap().compute_failures, 1);
        assert_eq!(stats.domain(ROI_HIERARCHY).unwrap().computations, 2);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        let unknown = manager
            .get_or_compute("synapses", "Dm4", Ttl::DomainDefault, || async {
                Ok::<_, anyhow::Error>(1)
            })
            .await
            .unwrap_err();
        assert!(matches!(unknown, CacheError::UnknownDomain { .. }));

        let zero_ttl = manager
            .get_or_compute(NEURON_DATA, "Dm4", Ttl::After(Duration::ZERO), || async {
                Ok::<_, anyhow::Error>(1)
            })
            .await
            .unwrap_err();
        assert!(matches!(zero_ttl, CacheError::InvalidTtl { .. }));

        let bad_key = manager
            .put(NEURON_DATA, "bad\u{0}name", &1, Ttl::Never)
            .await
            .unwrap_err();
        assert!(bad_key.is_validation());
    }

    #[tokio::test]
    async fn test_timeout_is_caller_local() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let err = manager
            .get_or_compute_with_timeout(
                META,
                "version",
                Ttl::Never,
                Duration::from_millis(10),
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, anyhow::Error>("1.0".to_string())
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Timeout(_)));

        manager.flush().await;
        assert_eq!(manager.pending(), 0);

        let cached: Option<String> = manager.get(META, "version").await.unwrap();
        assert_eq!(cached.as_deref(), Some("1.0"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_recomputed() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        manager
            .put(NEURON_DATA, "Dm4", &"not a summary", Ttl::DomainDefault)
            .await
            .unwrap();

        let value: NeuronSummary = manager
            .get_or_compute(NEURON_DATA, "Dm4", Ttl::DomainDefault, || async {
                Ok::<_, anyhow::Error>(dm4())
            })
            .await
            .unwrap();
        assert_eq!(value, dm4());
        assert_eq!(manager.stats().await.domain(NEURON_DATA).unwrap().corruptions, 1);
    }

    #[tokio::test]
    async fn test_memory_only_domain_writes_nothing_to_disk() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        manager
            .put(SOMA_SIDES, "Dm4", &vec!["L", "R"], Ttl::DomainDefault)
            .await
            .unwrap();
        let sides: Option<Vec<String>> = manager.get(SOMA_SIDES, "Dm4").await.unwrap();
        assert_eq!(sides, Some(vec!["L".to_string(), "R".to_string()]));
        assert!(!temp_dir.path().join(SOMA_SIDES).exists());

        let stats = manager.stats().await;
        assert!(!stats.domain(SOMA_SIDES).unwrap().persisted);
        assert_eq!(stats.domain(SOMA_SIDES).unwrap().persisted_entries, None);
    }

    #[tokio::test]
    async fn test_invalidate_variants() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        manager.put(NEURON_DATA, ("Dm4", "left"), &1, Ttl::Never).await.unwrap();
        manager.put(NEURON_DATA, ("Dm4", "right"), &2, Ttl::Never).await.unwrap();
        manager.put(NEURON_DATA, ("Dm40", "left"), &3, Ttl::Never).await.unwrap();
        manager.put(SOMA_SIDES, "Dm4", &4, Ttl::Never).await.unwrap();
        manager.put(META, "version", &5, Ttl::Never).await.unwrap();

        let removed = manager
            .invalidate(Invalidation::key(NEURON_DATA, ("Dm4", "right")))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        // One entity, every domain.
        let removed = manager.invalidate(Invalidation::entity("Dm4")).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(manager.get::<u32>(NEURON_DATA, ("Dm4", "left")).await.unwrap(), None);
        assert_eq!(manager.get::<u32>(SOMA_SIDES, "Dm4").await.unwrap(), None);
        assert_eq!(manager.get::<u32>(NEURON_DATA, ("Dm40", "left")).await.unwrap(), Some(3));

        assert_eq!(manager.invalidate(Invalidation::Domain(META.to_string())).await.unwrap(), 1);
        assert_eq!(manager.get::<u32>(META, "version").await.unwrap(), None);

        assert_eq!(manager.invalidate(Invalidation::All).await.unwrap(), 1);
        assert_eq!(manager.get::<u32>(NEURON_DATA, ("Dm40", "left")).await.unwrap(), None);

        assert!(manager
            .invalidate(Invalidation::prefix("nope", "Dm4"))
            .await
            .unwrap_err()
            .is_validation());
    }

    #[tokio::test]
    async fn test_fractional_ttl_expires_in_both_tiers() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        // Start just after a second boundary, where truncating the creation
        // time to whole seconds would leave the disk copy alive longest.
        let into_second = chrono::Utc::now().timestamp_subsec_millis();
        if into_second > 100 {
            tokio::time::sleep(Duration::from_millis(u64::from(1000u32.saturating_sub(into_second)))).await;
        }

        manager
            .put(NEURON_DATA, "Dm4", &1u32, Ttl::After(Duration::from_millis(1500)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1650)).await;

        assert_eq!(manager.get::<u32>(NEURON_DATA, "Dm4").await.unwrap(), None);
        assert_eq!(manager.stats().await.domain(NEURON_DATA).unwrap().promotions, 0);
    }

    #[tokio::test]
    async fn test_persisted_domain_writes_under_its_directory() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        manager.put(COLUMNS, "ME(R)", &3u32, Ttl::DomainDefault).await.unwrap();

        let directory = manager.domain(COLUMNS).unwrap().directory(temp_dir.path());
        assert_eq!(std::fs::read_dir(directory).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_restart_reads_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        {
            let first = manager(&temp_dir);
            first.put(NEURON_DATA, ("Dm4", "left"), &dm4(), Ttl::DomainDefault).await.unwrap();
        }

        let second = manager(&temp_dir);
        let value: NeuronSummary = second
            .get_or_compute(NEURON_DATA, ("Dm4", "left"), Ttl::DomainDefault, || async {
                Err::<NeuronSummary, _>(anyhow::anyhow!("must not recompute"))
            })
            .await
            .unwrap();
        assert_eq!(value, dm4());
        assert_eq!(second.stats().await.domain(NEURON_DATA).unwrap().promotions, 1);
    }

    #[tokio::test]
    async fn test_check_root() {
        let temp_dir = TempDir::new().unwrap();
        manager(&temp_dir).check_root().await.unwrap();

        let blocked = temp_dir.path().join("blocked");
        std::fs::write(&blocked, b"").unwrap();
        let scheme = CacheKeyScheme::new("server", "cns").unwrap();
        let manager = CacheManager::new(CacheSettings::new(&blocked), scheme).unwrap();
        assert!(manager.check_root().await.is_err());

        let memory_only = CacheSettings::new(&blocked);
        let memory_only = CacheSettings {
            domains: BTreeMap::from([(META.to_string(), DomainSettings::memory_only(None))]),
            ..memory_only
        };
        let scheme = CacheKeyScheme::new("server", "cns").unwrap();
        CacheManager::new(memory_only, scheme)
            .unwrap()
            .check_root()
            .await
            .unwrap();
    }
}
