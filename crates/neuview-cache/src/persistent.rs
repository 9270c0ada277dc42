//! Disk-backed cache tier
//!
//! One file per `(domain, key)` under `<cache_root>/<domain>/`, named by the
//! SHA-256 of the pair. Each file is a small binary header followed by the
//! JSON payload (all integers big-endian):
//!
//! ```text
//! [format_version: u8]
//! [created_at: i64, unix milliseconds]
//! [ttl_millis: i64, -1 = none]
//! [domain_len: u16][domain: utf8]
//! [key_len: u16][key: utf8]
//! [payload_len: u64][payload: bytes]
//! ```
//!
//! The embedded domain and key are checked on every read, which catches hash
//! collisions and files that do not belong where they are found.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    domain::CacheDomain,
    entry::{CacheEntry, Lookup},
    error::{CacheError, Result},
    metrics::{CacheMetrics, DiskUsage, MetricsSnapshot},
    storage::CacheStorage,
};

/// Current on-disk format version
pub const FORMAT_VERSION: u8 = 1;

const CACHE_EXTENSION: &str = "cache";
const TEMP_EXTENSION: &str = "tmp";
/// Temporary files older than this belong to a writer that died mid-write
const ORPHAN_TEMP_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
enum FormatError {
    #[error("unknown format version {0}")]
    UnknownVersion(u8),
    #[error("record is truncated")]
    Truncated,
    #[error("{0} bytes of trailing data")]
    TrailingBytes(usize),
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
    #[error("invalid creation timestamp {0}")]
    InvalidTimestamp(i64),
    #[error("invalid ttl {0}")]
    InvalidTtl(i64),
}

/// Decoded header of a cache file
#[derive(Debug, PartialEq)]
struct Record<'a> {
    created_at: DateTime<Utc>,
    ttl: Option<Duration>,
    domain: &'a str,
    key: &'a str,
    payload: &'a [u8],
}

impl Record<'_> {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()) else {
            return false;
        };
        self.created_at
            .checked_add_signed(ttl)
            .map_or(false, |expires| now > expires)
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> std::result::Result<&'a [u8], FormatError> {
        if self.buf.len() < len {
            return Err(FormatError::Truncated);
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> std::result::Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn str(&mut self, field: &'static str) -> std::result::Result<&'a str, FormatError> {
        let len = u16::from_be_bytes(self.array()?) as usize;
        std::str::from_utf8(self.take(len)?).map_err(|_| FormatError::InvalidUtf8(field))
    }
}

fn encode(domain: &str, entry: &CacheEntry) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(&entry.payload).map_err(|e| CacheError::Serialization {
        message: e.to_string(),
    })?;
    let domain_len = u16::try_from(domain.len())
        .map_err(|_| CacheError::invalid_key(format!("domain '{}' is too long to store", domain)))?;
    let key_len = u16::try_from(entry.key.len())
        .map_err(|_| CacheError::invalid_key("key is too long to store"))?;

    // Both fields are truncated, so the stored expiry never falls after the
    // in-memory one.
    let ttl_millis: i64 = match entry.ttl {
        Some(ttl) => i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
        None => -1,
    };

    let mut buf = Vec::with_capacity(1 + 8 + 8 + 2 + domain.len() + 2 + entry.key.len() + 8 + payload.len());
    buf.push(FORMAT_VERSION);
    buf.extend_from_slice(&entry.created_at.timestamp_millis().to_be_bytes());
    buf.extend_from_slice(&ttl_millis.to_be_bytes());
    buf.extend_from_slice(&domain_len.to_be_bytes());
    buf.extend_from_slice(domain.as_bytes());
    buf.extend_from_slice(&key_len.to_be_bytes());
    buf.extend_from_slice(entry.key.as_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn decode(bytes: &[u8]) -> std::result::Result<Record<'_>, FormatError> {
    let mut cursor = Cursor { buf: bytes };

    let [version] = cursor.array::<1>()?;
    if version != FORMAT_VERSION {
        return Err(FormatError::UnknownVersion(version));
    }

    let created_millis = i64::from_be_bytes(cursor.array()?);
    let created_at = DateTime::<Utc>::from_timestamp_millis(created_millis)
        .ok_or(FormatError::InvalidTimestamp(created_millis))?;

    let ttl = match i64::from_be_bytes(cursor.array()?) {
        -1 => None,
        millis if millis >= 0 => Some(Duration::from_millis(millis as u64)),
        millis => return Err(FormatError::InvalidTtl(millis)),
    };

    let domain = cursor.str("domain")?;
    let key = cursor.str("key")?;

    let payload_len = u64::from_be_bytes(cursor.array()?);
    let remaining = cursor.buf.len() as u64;
    if remaining < payload_len {
        return Err(FormatError::Truncated);
    }
    if remaining > payload_len {
        return Err(FormatError::TrailingBytes((remaining - payload_len) as usize));
    }

    Ok(Record {
        created_at,
        ttl,
        domain,
        key,
        payload: cursor.buf,
    })
}

/// Disk-backed cache tier for one domain
pub struct PersistentTier {
    domain: String,
    directory: PathBuf,
    metrics: CacheMetrics,
}

impl PersistentTier {
    /// Create a tier storing files under `<cache_root>/<domain>/`.
    ///
    /// Nothing touches the disk until the first write.
    pub fn new(cache_root: impl AsRef<Path>, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        Self {
            directory: cache_root.as_ref().join(&domain),
            domain,
            metrics: CacheMetrics::new(),
        }
    }

    /// Create the tier for a configured domain
    pub fn for_domain(cache_root: &Path, domain: &CacheDomain) -> Self {
        Self {
            directory: domain.directory(cache_root),
            domain: domain.name().to_string(),
            metrics: CacheMetrics::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file holding `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", file_stem(&self.domain, key), CACHE_EXTENSION))
    }

    pub fn counters(&self) -> &CacheMetrics {
        &self.metrics
    }

    async fn discard_corrupted(&self, path: &Path, reason: impl std::fmt::Display) {
        let err = CacheError::Corrupted {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        warn!("Discarding cache file: {}", err);
        self.metrics.record_corruption();
        self.remove_file(path).await;
    }

    async fn remove_file(&self, path: &Path) -> bool {
        match fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                self.metrics.record_storage_error();
                warn!("Failed to remove cache file {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Read a file, treating a vanished file as absent and logging other errors
    async fn read_file(&self, path: &Path) -> Option<Vec<u8>> {
        match fs::read(path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                self.metrics.record_storage_error();
                warn!("Failed to read cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Files in the domain directory with the given extension
    async fn files_with_extension(&self, extension: &str) -> Vec<PathBuf> {
        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                self.metrics.record_storage_error();
                warn!("Failed to list {}: {}", self.directory.display(), e);
                return Vec::new();
            }
        };

        let mut files = Vec::new();
        loop {
            match dir.next_entry().await {
                Ok(Some(item)) => {
                    let path = item.path();
                    if path.extension().map_or(false, |ext| ext == extension) {
                        files.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.metrics.record_storage_error();
                    warn!("Failed to list {}: {}", self.directory.display(), e);
                    break;
                }
            }
        }
        files
    }

    /// Visit every readable record, discarding the corrupted ones
    async fn scan<F>(&self, mut visit: F)
    where
        F: FnMut(&Path, &Record<'_>) + Send,
    {
        for path in self.files_with_extension(CACHE_EXTENSION).await {
            let Some(bytes) = self.read_file(&path).await else {
                continue;
            };
            match decode(&bytes) {
                Ok(record) if record.domain == self.domain && self.path_for(record.key) == path => {
                    visit(&path, &record);
                }
                Ok(_) => self.discard_corrupted(&path, "embedded domain/key do not match file").await,
                Err(e) => self.discard_corrupted(&path, e).await,
            }
        }
    }

    async fn remove_orphaned_temp_files(&self) {
        for path in self.files_with_extension(TEMP_EXTENSION).await {
            let age = fs::metadata(&path)
                .await
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok());
            if age.map_or(false, |age| age > ORPHAN_TEMP_AGE) && self.remove_file(&path).await {
                debug!("Removed orphaned temporary file {}", path.display());
            }
        }
    }
}

#[async_trait]
impl CacheStorage for PersistentTier {
    fn domain(&self) -> &str {
        &self.domain
    }

    async fn get(&self, key: &str) -> Lookup<CacheEntry> {
        let path = self.path_for(key);
        let Some(bytes) = self.read_file(&path).await else {
            self.metrics.record_miss();
            return Lookup::Miss;
        };

        let record = match decode(&bytes) {
            Ok(record) => record,
            Err(e) => {
                self.discard_corrupted(&path, e).await;
                return Lookup::Corrupted;
            }
        };

        if record.domain != self.domain || record.key != key {
            self.discard_corrupted(
                &path,
                format!("holds {}/{} instead of {}/{}", record.domain, record.key, self.domain, key),
            )
            .await;
            return Lookup::Corrupted;
        }

        if record.is_expired_at(Utc::now()) {
            debug!("Persistent entry expired: {}", key);
            self.metrics.record_expiration();
            self.metrics.record_miss();
            self.remove_file(&path).await;
            return Lookup::Miss;
        }

        let payload = match serde_json::from_slice(record.payload) {
            Ok(payload) => payload,
            Err(e) => {
                self.discard_corrupted(&path, format!("payload is not valid JSON: {}", e))
                    .await;
                return Lookup::Corrupted;
            }
        };

        self.metrics.record_hit();
        Lookup::Hit(CacheEntry::new(key, payload, record.ttl).with_created_at(record.created_at))
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let bytes = encode(&self.domain, entry)?;

        let written = async {
            fs::create_dir_all(&self.directory).await?;

            // Write beside the target, then rename over it, so a reader sees
            // either the old file or the complete new one.
            let temp_path = self.directory.join(format!(
                ".{}.{}.{}",
                file_stem(&self.domain, &entry.key),
                Uuid::new_v4().simple(),
                TEMP_EXTENSION
            ));
            let result = async {
                let mut file = fs::File::create(&temp_path).await?;
                file.write_all(&bytes).await?;
                file.sync_all().await?;
                drop(file);
                fs::rename(&temp_path, self.path_for(&entry.key)).await
            }
            .await;

            if result.is_err() {
                let _ = fs::remove_file(&temp_path).await;
            }
            result
        }
        .await;

        written.map_err(|e| {
            self.metrics.record_storage_error();
            let err = CacheError::storage(self.path_for(&entry.key), e);
            warn!("Failed to persist cache entry: {}", err);
            err
        })
    }

    async fn delete(&self, key: &str) -> bool {
        self.remove_file(&self.path_for(key)).await
    }

    async fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.scan(|_, record| keys.push(record.key.to_string())).await;
        keys
    }

    async fn clean(&self) -> usize {
        let now = Utc::now();
        let mut expired = Vec::new();
        self.scan(|path, record| {
            if record.is_expired_at(now) {
                expired.push(path.to_path_buf());
            }
        })
        .await;

        let mut removed = 0;
        for path in &expired {
            if self.remove_file(path).await {
                self.metrics.record_expiration();
                removed += 1;
            }
        }
        self.remove_orphaned_temp_files().await;

        info!("Removed {} expired entries from {}", removed, self.domain);
        removed
    }

    async fn clear(&self) -> usize {
        let mut removed = 0;
        for path in self.files_with_extension(CACHE_EXTENSION).await {
            if self.remove_file(&path).await {
                removed += 1;
            }
        }
        for path in self.files_with_extension(TEMP_EXTENSION).await {
            self.remove_file(&path).await;
        }

        info!("Cleared {} entries from {}", removed, self.domain);
        removed
    }

    async fn usage(&self) -> DiskUsage {
        let mut usage = DiskUsage::default();
        for path in self.files_with_extension(CACHE_EXTENSION).await {
            if let Ok(meta) = fs::metadata(&path).await {
                usage.entries += 1;
                usage.bytes += meta.len();
            }
        }
        usage
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn file_stem(domain: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
