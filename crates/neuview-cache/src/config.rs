//! Cache configuration values
//!
//! Parsing configuration files is the job of the caller; these types only
//! describe the values the cache consumes and validate them.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    domain::{self, validate_domain_name},
    error::{CacheError, Result},
};

/// Default location of the persistent tier, relative to the working directory
pub const DEFAULT_CACHE_ROOT: &str = ".cache/neuview";

const DAY_SECS: u64 = 24 * 3600;

/// Top-level cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Root directory for persisted domains
    pub cache_root: PathBuf,
    /// Memory tier capacity, shared default for every domain
    pub memory: MemorySettings,
    /// Per-domain settings. Domains listed here replace the built-in
    /// settings of the same name; unlisted built-in domains are kept.
    #[serde(deserialize_with = "deserialize_domains")]
    pub domains: BTreeMap<String, DomainSettings>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            memory: MemorySettings::default(),
            domains: default_domains(),
        }
    }
}

impl CacheSettings {
    /// Settings with the built-in domains rooted at `cache_root`
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Self::default()
        }
    }

    /// Add or replace a domain
    pub fn with_domain(mut self, name: impl Into<String>, settings: DomainSettings) -> Self {
        self.domains.insert(name.into(), settings);
        self
    }

    pub fn with_memory(mut self, memory: MemorySettings) -> Self {
        self.memory = memory;
        self
    }

    /// Check every value the cache relies on
    pub fn validate(&self) -> Result<()> {
        self.memory.validate()?;

        if self.domains.is_empty() {
            return Err(CacheError::invalid_config(
                "domains",
                "at least one cache domain is required",
            ));
        }

        for (name, settings) in &self.domains {
            validate_domain_name(name)?;
            settings.validate(name)?;
        }

        Ok(())
    }
}

/// Memory tier capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Maximum number of entries per domain
    pub max_entries: usize,
    /// Optional cap on payload bytes per domain
    pub max_bytes: Option<u64>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_bytes: None,
        }
    }
}

impl MemorySettings {
    fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::invalid_config(
                "memory.max_entries",
                "must be greater than zero",
            ));
        }
        if self.max_bytes == Some(0) {
            return Err(CacheError::invalid_config(
                "memory.max_bytes",
                "must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

/// Settings for one cache domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainSettings {
    /// Default TTL in seconds; `None` means entries never time-expire
    pub ttl_secs: Option<u64>,
    /// Write entries through to the persistent tier
    pub persist: bool,
    /// Domain-specific memory tier capacity
    pub max_entries: Option<usize>,
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            ttl_secs: Some(DAY_SECS),
            persist: true,
            max_entries: None,
        }
    }
}

impl DomainSettings {
    /// A persisted domain with the given TTL
    pub fn persistent(ttl_secs: Option<u64>) -> Self {
        Self {
            ttl_secs,
            persist: true,
            max_entries: None,
        }
    }

    /// A session-scoped domain that never touches disk
    pub fn memory_only(ttl_secs: Option<u64>) -> Self {
        Self {
            ttl_secs,
            persist: false,
            max_entries: None,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.ttl_secs == Some(0) {
            return Err(CacheError::invalid_config(
                format!("domains.{}.ttl_secs", name),
                "must be greater than zero when set",
            ));
        }
        if self.max_entries == Some(0) {
            return Err(CacheError::invalid_config(
                format!("domains.{}.max_entries", name),
                "must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

/// Built-in domains used by report generation
pub fn default_domains() -> BTreeMap<String, DomainSettings> {
    BTreeMap::from([
        (
            domain::NEURON_DATA.to_string(),
            DomainSettings::persistent(Some(DAY_SECS)),
        ),
        (
            domain::ROI_HIERARCHY.to_string(),
            DomainSettings::persistent(Some(DAY_SECS)),
        ),
        (
            domain::COLUMNS.to_string(),
            DomainSettings::persistent(Some(DAY_SECS)),
        ),
        (
            domain::SOMA_SIDES.to_string(),
            DomainSettings::memory_only(Some(3600)),
        ),
        (domain::META.to_string(), DomainSettings::memory_only(None)),
    ])
}

fn deserialize_domains<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, DomainSettings>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, DomainSettings>::deserialize(deserializer)?;
    let mut domains = default_domains();
    domains.extend(overrides);
    Ok(domains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = CacheSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.cache_root, PathBuf::from(DEFAULT_CACHE_ROOT));
        assert_eq!(settings.domains.len(), 5);
        assert!(settings.domains[domain::NEURON_DATA].persist);
        assert!(!settings.domains[domain::META].persist);
        assert_eq!(settings.domains[domain::META].ttl(), None);
    }

    #[test]
    fn test_domain_overrides_merge_with_defaults() {
        let settings: CacheSettings = serde_json::from_value(json!({
            "cache_root": "/var/cache/neuview",
            "memory": { "max_entries": 50 },
            "domains": {
                "neuron_data": { "ttl_secs": 60, "persist": false },
                "synapses": { "ttl_secs": 120 }
            }
        }))
        .unwrap();

        settings.validate().unwrap();
        assert_eq!(settings.memory.max_entries, 50);
        assert_eq!(settings.memory.max_bytes, None);
        assert_eq!(settings.domains.len(), 6);
        assert_eq!(
            settings.domains["neuron_data"],
            DomainSettings::memory_only(Some(60))
        );
        assert!(settings.domains["synapses"].persist);
        assert_eq!(
            settings.domains[domain::ROI_HIERARCHY],
            DomainSettings::persistent(Some(DAY_SECS))
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_capacity = CacheSettings::default().with_memory(MemorySettings {
            max_entries: 0,
            max_bytes: None,
        });
        assert!(matches!(
            zero_capacity.validate(),
            Err(CacheError::InvalidConfig { .. })
        ));

        let zero_ttl = CacheSettings::default().with_domain("x", DomainSettings::persistent(Some(0)));
        assert!(zero_ttl.validate().is_err());

        let bad_name = CacheSettings::default().with_domain("Bad/Name", DomainSettings::default());
        assert!(bad_name.validate().unwrap_err().is_validation());

        let mut empty = CacheSettings::default();
        empty.domains.clear();
        assert!(empty.validate().is_err());
    }
}
