//! Deduplication of concurrent cache population
//!
//! Each key is either idle or being populated. The first caller for an idle
//! key becomes the leader: its population future is spawned onto the runtime
//! and a watch channel is registered for the key. Every later caller for that
//! key subscribes to the channel instead of computing. When the future
//! finishes the key returns to idle and then its outcome is published to all
//! subscribers, so a failure is never remembered past the callers that
//! shared it.
//!
//! Because the population runs in its own task, dropping any waiter
//! (including the caller that started it) never cancels it.

use std::{future::Future, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::watch;
use tracing::debug;

use crate::error::CacheError;

/// Result of one population, shared with every waiter
pub type Outcome = std::result::Result<serde_json::Value, CacheError>;

type Slot = watch::Receiver<Option<Outcome>>;

/// Returns the key to idle when the population task ends, even by panic
struct CleanupGuard {
    inflight: Arc<DashMap<String, Slot>>,
    key: String,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}

/// Tracks which keys are currently being populated
#[derive(Default)]
pub struct InFlightTracker {
    inflight: Arc<DashMap<String, Slot>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently being populated
    pub fn pending(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_populating(&self, key: &str) -> bool {
        self.inflight.contains_key(key)
    }

    /// Wait for the outcome of populating `key`.
    ///
    /// `populate` is only called if no population of `key` is running;
    /// otherwise this call joins the running one.
    pub async fn run<F, Fut>(&self, key: &str, populate: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let (rx, leader) = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(slot) => (slot.get().clone(), None),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx.clone());
                (rx, Some(tx))
            }
        };

        match leader {
            Some(tx) => {
                debug!("Populating {}", key);
                let guard = CleanupGuard {
                    inflight: self.inflight.clone(),
                    key: key.to_string(),
                };
                let population = populate();
                tokio::spawn(async move {
                    let outcome = population.await;
                    // Return the key to idle before anyone can observe the outcome.
                    drop(guard);
                    tx.send_replace(Some(outcome));
                });
            }
            None => debug!("Joining in-flight population of {}", key),
        }

        wait(rx, key).await
    }

    /// Wait until every population running now has finished
    pub async fn wait_idle(&self) {
        let running: Vec<Slot> = self
            .inflight
            .iter()
            .map(|slot| slot.value().clone())
            .collect();

        for mut rx in running {
            let _ = rx.wait_for(|outcome| outcome.is_some()).await;
        }
    }
}

async fn wait(mut rx: Slot, key: &str) -> Outcome {
    let outcome = rx
        .wait_for(|outcome| outcome.is_some())
        .await
        .ok()
        .and_then(|published| published.clone());

    outcome.unwrap_or_else(|| {
        Err(CacheError::Compute(Arc::new(anyhow::anyhow!(
            "population of {} ended without a result",
            key
        ))))
    })
}
