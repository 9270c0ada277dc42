//! Cache entries and lookup outcomes

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single cached value with its bookkeeping metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fully qualified cache key
    pub key: String,
    /// The cached payload
    pub payload: serde_json::Value,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// Time-to-live; `None` never time-expires
    pub ttl: Option<Duration>,
    /// Last time the entry was read or written
    pub last_access_at: DateTime<Utc>,
    /// Number of hits served by this entry
    pub access_count: u64,
    /// Approximate size of the payload in bytes
    pub size_bytes: u64,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(key: impl Into<String>, payload: serde_json::Value, ttl: Option<Duration>) -> Self {
        let now = Utc::now();
        let size_bytes = serde_json::to_vec(&payload)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0);

        Self {
            key: key.into(),
            payload,
            created_at: now,
            ttl,
            last_access_at: now,
            access_count: 0,
            size_bytes,
        }
    }

    /// Override the creation timestamp (entries reloaded from disk keep theirs).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Instant after which the entry is expired, if it has a TTL.
    ///
    /// A TTL too large to represent never expires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.ttl?).ok()?;
        self.created_at.checked_add_signed(ttl)
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(false, |expires| now > expires)
    }

    /// Get remaining TTL
    pub fn ttl_remaining(&self) -> Option<Duration> {
        (self.expires_at()? - Utc::now()).to_std().ok()
    }

    /// Record a hit.
    pub fn touch(&mut self) {
        self.last_access_at = Utc::now();
        self.access_count += 1;
    }
}

/// Outcome of a single tier lookup.
///
/// `Corrupted` is reported separately from `Miss` so degraded reads stay
/// visible; callers above the tiers treat it as a miss.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Hit(T),
    Miss,
    Corrupted,
}

impl<T> Lookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, Lookup::Corrupted)
    }

    pub fn into_hit(self) -> Option<T> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::Corrupted => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Hit(value) => Lookup::Hit(f(value)),
            Lookup::Miss => Lookup::Miss,
            Lookup::Corrupted => Lookup::Corrupted,
        }
    }
}
