//! Cache domains: named partitions of the keyspace

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    config::{DomainSettings, MemorySettings},
    error::{CacheError, Result},
};

/// Per-neuron-type query results
pub const NEURON_DATA: &str = "neuron_data";
/// Region-of-interest hierarchy of a dataset
pub const ROI_HIERARCHY: &str = "roi_hierarchy";
/// Column coverage data
pub const COLUMNS: &str = "columns";
/// Soma side lookups
pub const SOMA_SIDES: &str = "soma_sides";
/// Dataset metadata
pub const META: &str = "meta";

/// Domain names become directory names, so keep them to `[a-z0-9_-]`.
pub fn validate_domain_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');

    if valid {
        Ok(())
    } else {
        Err(CacheError::invalid_config(
            "domain",
            format!("'{}' must be 1-64 characters of [a-z0-9_-]", name),
        ))
    }
}

/// A resolved cache domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDomain {
    name: String,
    default_ttl: Option<Duration>,
    persist: bool,
    max_entries: usize,
    max_bytes: Option<u64>,
}

impl CacheDomain {
    pub fn new(name: impl Into<String>, settings: &DomainSettings, memory: &MemorySettings) -> Result<Self> {
        let name = name.into();
        validate_domain_name(&name)?;

        Ok(Self {
            default_ttl: settings.ttl(),
            persist: settings.persist,
            max_entries: settings.max_entries.unwrap_or(memory.max_entries),
            max_bytes: memory.max_bytes,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Whether entries are written through to disk
    pub fn persist(&self) -> bool {
        self.persist
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn max_bytes(&self) -> Option<u64> {
        self.max_bytes
    }

    /// On-disk directory of this domain under `cache_root`
    pub fn directory(&self, cache_root: &Path) -> PathBuf {
        cache_root.join(&self.name)
    }
}
