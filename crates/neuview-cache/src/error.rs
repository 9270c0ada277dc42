//! Cache-related error types

use std::{path::PathBuf, sync::Arc, time::Duration};

use thiserror::Error;

/// Cache operation errors
///
/// Only validation errors, compute errors and timeouts reach callers of
/// [`CacheManager::get_or_compute`](crate::CacheManager::get_or_compute).
/// Storage and corruption errors are produced by the tiers and absorbed
/// (logged and counted) before they get that far.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Unknown cache domain: {domain}")]
    UnknownDomain { domain: String },

    #[error("Invalid cache key: {message}")]
    InvalidKey { message: String },

    #[error("Invalid TTL: {message}")]
    InvalidTtl { message: String },

    #[error("Invalid cache configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    #[error("Unknown cache action: {action} (expected stats, clean or clear)")]
    UnknownAction { action: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// The caller-supplied computation failed. Shared by every waiter.
    #[error("Computation failed: {0}")]
    Compute(Arc<anyhow::Error>),

    #[error("Timed out after {0:?} waiting for cache population")]
    Timeout(Duration),

    #[error("Storage error on {path}: {message}")]
    Storage { path: PathBuf, message: String },

    #[error("Corrupted cache file {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },
}

impl CacheError {
    pub(crate) fn storage(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by bad input from the caller.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownDomain { .. }
                | Self::InvalidKey { .. }
                | Self::InvalidTtl { .. }
                | Self::InvalidConfig { .. }
                | Self::UnknownAction { .. }
                | Self::Serialization { .. }
        )
    }

    /// True when the caller-supplied computation failed.
    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Compute(_))
    }
}

/// Re-export commonly used Result type
pub type Result<T> = std::result::Result<T, CacheError>;
