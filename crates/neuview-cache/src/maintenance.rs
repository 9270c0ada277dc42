//! Operator-facing cache maintenance
//!
//! Backs the `cache` command. Argument parsing belongs to the caller; this
//! module turns an already-parsed [`CacheAction`] into a [`CommandOutcome`]
//! carrying the exit code and the text to print.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{error::CacheError, manager::CacheManager, metrics::CacheReport};

/// Exit code for a successful maintenance action
pub const EXIT_OK: i32 = 0;
/// Exit code when the cache root cannot be used
pub const EXIT_CACHE_ROOT: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheAction {
    /// Print per-domain statistics
    Stats,
    /// Remove expired entries
    Clean,
    /// Remove everything
    Clear,
}

impl fmt::Display for CacheAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheAction::Stats => write!(f, "stats"),
            CacheAction::Clean => write!(f, "clean"),
            CacheAction::Clear => write!(f, "clear"),
        }
    }
}

impl FromStr for CacheAction {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stats" => Ok(CacheAction::Stats),
            "clean" => Ok(CacheAction::Clean),
            "clear" => Ok(CacheAction::Clear),
            _ => Err(CacheError::UnknownAction {
                action: s.to_string(),
            }),
        }
    }
}

/// Result of running one maintenance action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub action: CacheAction,
    pub exit_code: i32,
    pub message: String,
    /// Entries removed by `clean` or `clear`
    pub removed: Option<usize>,
    /// Statistics, for `stats`
    pub report: Option<CacheReport>,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == EXIT_OK
    }
}

/// Run `action` against `manager`
pub async fn run(manager: &CacheManager, action: CacheAction) -> CommandOutcome {
    if let Err(err) = manager.check_root().await {
        error!("Cache root {} is not usable: {}", manager.cache_root().display(), err);
        return CommandOutcome {
            action,
            exit_code: EXIT_CACHE_ROOT,
            message: format!(
                "cache root {} is not accessible: {}",
                manager.cache_root().display(),
                err
            ),
            removed: None,
            report: None,
        };
    }

    match action {
        CacheAction::Stats => {
            let report = manager.stats().await;
            let mut message = report.summary();
            message.push_str(&format!(
                "Absorbed storage and corruption events: {}\n",
                report.absorbed_events()
            ));
            CommandOutcome {
                action,
                exit_code: EXIT_OK,
                message,
                removed: None,
                report: Some(report),
            }
        }
        CacheAction::Clean => {
            let removed = manager.clean_expired().await;
            CommandOutcome {
                action,
                exit_code: EXIT_OK,
                message: format!("Removed {} expired cache entries", removed),
                removed: Some(removed),
                report: None,
            }
        }
        CacheAction::Clear => {
            let removed = manager.clear().await;
            info!("Cleared {} cache entries", removed);
            CommandOutcome {
                action,
                exit_code: EXIT_OK,
                message: format!("Cleared {} cache entries", removed),
                removed: Some(removed),
                report: None,
            }
        }
    }
}
