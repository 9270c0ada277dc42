//! # NeuView Cache
//!
//! Multi-tier caching for report generation: expensive upstream query
//! results are kept in a bounded in-memory LRU tier and, for persisted
//! domains, in an on-disk tier that survives restarts.
//!
//! ## Features
//!
//! - **Two tiers**: memory (L1) in front of atomic on-disk files (L2), with
//!   promotion of L2 hits into L1
//! - **Domains**: independently configured TTL, capacity and persistence
//! - **Deduplicated population**: concurrent misses for one key share a
//!   single computation
//! - **Collision-free keys**: namespaced by domain, server and dataset
//! - **Graceful degradation**: storage faults and corrupted files are logged,
//!   counted and treated as misses
//!
//! ```no_run
//! use neuview_cache::{CacheKeyScheme, CacheManager, CacheSettings, Ttl, domain};
//!
//! # async fn example() -> neuview_cache::Result<()> {
//! let scheme = CacheKeyScheme::new("neuprint.janelia.org", "optic-lobe:v1.0")?;
//! let cache = CacheManager::new(CacheSettings::default(), scheme)?;
//!
//! let cells: u32 = cache
//!     .get_or_compute(domain::NEURON_DATA, ("Dm4", "left"), Ttl::DomainDefault, || async {
//!         Ok::<_, anyhow::Error>(31)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod composite;
pub mod config;
pub mod domain;
pub mod entry;
pub mod error;
pub mod inflight;
pub mod key;
pub mod maintenance;
pub mod manager;
pub mod memory;
pub mod metrics;
pub mod persistent;
pub mod storage;

pub use composite::{CompositeCache, CompositeCacheBuilder};
pub use config::{CacheSettings, DomainSettings, MemorySettings};
pub use domain::CacheDomain;
pub use entry::{CacheEntry, Lookup};
pub use error::CacheError;
pub use inflight::InFlightTracker;
pub use key::{CacheKeyScheme, KeyParts, KeyPrefix};
pub use maintenance::{CacheAction, CommandOutcome};
pub use manager::{CacheManager, Invalidation, Ttl};
pub use memory::MemoryTier;
pub use metrics::{CacheMetrics, CacheReport, DiskUsage, DomainStats, MemoryStats, MetricsSnapshot};
pub use persistent::PersistentTier;
pub use storage::CacheStorage;

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, CacheError>;
