//! Deterministic cache key construction
//!
//! A key is `domain:server:dataset:discriminator`, where the discriminator is
//! the escaped, `:`-joined list of [`KeyParts`]. Inputs are normalized first
//! so that superficially different spellings of the same query share a key,
//! and every component is escaped so `:` only ever separates components.

use crate::{
    domain::validate_domain_name,
    error::{CacheError, Result},
};

/// Longest key the persistent tier will store
pub const MAX_KEY_LEN: usize = 4096;

/// Operation discriminator of a key, e.g. `("Dm4", "left")`
///
/// Components are trimmed and trailing empty components dropped, so `""`
/// and no parts at all both mean "whole dataset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyParts(Vec<String>);

impl KeyParts {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parts: Vec<String> = parts
            .into_iter()
            .map(|part| part.as_ref().trim().to_string())
            .collect();
        while parts.last().map_or(false, |last| last.is_empty()) {
            parts.pop();
        }
        Self(parts)
    }

    /// Whole-dataset discriminator
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    fn discriminator(&self) -> Result<String> {
        let mut escaped = Vec::with_capacity(self.0.len());
        for part in &self.0 {
            if part.chars().any(char::is_control) {
                return Err(CacheError::invalid_key(format!(
                    "key component {:?} contains control characters",
                    part
                )));
            }
            escaped.push(escape(part));
        }
        Ok(escaped.join(":"))
    }
}

impl From<&str> for KeyParts {
    fn from(part: &str) -> Self {
        Self::new([part])
    }
}

impl From<String> for KeyParts {
    fn from(part: String) -> Self {
        Self::new([part])
    }
}

impl From<(&str, &str)> for KeyParts {
    fn from((first, second): (&str, &str)) -> Self {
        Self::new([first, second])
    }
}

impl From<&[&str]> for KeyParts {
    fn from(parts: &[&str]) -> Self {
        Self::new(parts)
    }
}

impl<const N: usize> From<[&str; N]> for KeyParts {
    fn from(parts: [&str; N]) -> Self {
        Self::new(parts)
    }
}

impl From<Vec<String>> for KeyParts {
    fn from(parts: Vec<String>) -> Self {
        Self::new(parts)
    }
}

/// Builds keys for one upstream server and dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyScheme {
    server: String,
    dataset: String,
}

impl CacheKeyScheme {
    /// Create a scheme, normalizing the server address and dataset name
    pub fn new(server: &str, dataset: &str) -> Result<Self> {
        let server = normalize_server(server);
        if server.is_empty() {
            return Err(CacheError::invalid_key("upstream server must not be empty"));
        }

        let dataset = dataset.trim().to_lowercase();
        if dataset.is_empty() {
            return Err(CacheError::invalid_key("dataset must not be empty"));
        }

        if server.chars().chain(dataset.chars()).any(char::is_control) {
            return Err(CacheError::invalid_key(
                "server and dataset must not contain control characters",
            ));
        }

        Ok(Self { server, dataset })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Build the key for `parts` in `domain`
    pub fn key(&self, domain: &str, parts: &KeyParts) -> Result<String> {
        let key = format!("{}{}", self.base(domain)?, parts.discriminator()?);
        if key.len() > MAX_KEY_LEN {
            return Err(CacheError::invalid_key(format!(
                "key is {} bytes, limit is {}",
                key.len(),
                MAX_KEY_LEN
            )));
        }
        Ok(key)
    }

    /// Prefix matching every key in `domain` whose discriminator starts
    /// with the components of `parts`
    pub fn prefix(&self, domain: &str, parts: &KeyParts) -> Result<KeyPrefix> {
        Ok(KeyPrefix {
            base: self.base(domain)?,
            discriminator: parts.discriminator()?,
        })
    }

    fn base(&self, domain: &str) -> Result<String> {
        validate_domain_name(domain)?;
        Ok(format!(
            "{}:{}:{}:",
            domain,
            escape(&self.server),
            escape(&self.dataset)
        ))
    }
}

/// Component-boundary prefix over the discriminator of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix {
    base: String,
    discriminator: String,
}

impl KeyPrefix {
    /// `Dm4` matches `Dm4` and `Dm4:left` but not `Dm40:left`.
    pub fn matches(&self, key: &str) -> bool {
        let Some(rest) = key.strip_prefix(self.base.as_str()) else {
            return false;
        };
        if self.discriminator.is_empty() {
            return true;
        }
        match rest.strip_prefix(self.discriminator.as_str()) {
            Some(tail) => tail.is_empty() || tail.starts_with(':'),
            None => false,
        }
    }
}

fn normalize_server(server: &str) -> String {
    let server = server.trim().to_lowercase();
    let server = server
        .strip_prefix("https://")
        .or_else(|| server.strip_prefix("http://"))
        .unwrap_or(server.as_str());
    server.trim_end_matches('/').to_string()
}

fn escape(component: &str) -> String {
    component.replace('%', "%25").replace(':', "%3A")
}
