//! Run-group coordination for long-running (watch) mode.
//!
//! Two policies, matching how each routine treats overlapping triggers:
//!
//! - [`RunGroups`]: at most one in-flight run per key. A new run waits for the
//!   previous one and is never dropped. Used by the branch sync checker and
//!   the tag integrity monitor.
//! - [`LatestWins`]: a new run for a key aborts the in-flight one. Used by the
//!   scan gate, where only the newest diff matters.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::debug;

/// Key of a run group: one component against one repository (or pull request).
pub fn group_key(component: &str, subject: impl std::fmt::Display) -> String {
    format!("{component}:{subject}")
}

/// Serialises runs that share a key.
#[derive(Debug, Default)]
pub struct RunGroups {
    groups: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RunGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `fut` once no other run with `key` is in flight.
    ///
    /// Waiters are admitted in arrival order.
    pub async fn run<F, T>(&self, key: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = {
            let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(groups.entry(key.to_string()).or_default())
        };
        let _guard = lock.lock().await;
        debug!(%key, "Run group acquired");
        fut.await
    }
}

/// Keeps only the newest run per key.
#[derive(Debug, Default)]
pub struct LatestWins {
    inflight: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl LatestWins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `fut` for `key`, aborting any run still in flight for it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(&self, key: String, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        inflight.retain(|_, h| !h.is_finished());
        if let Some(previous) = inflight.insert(key.clone(), handle) {
            if !previous.is_finished() {
                previous.abort();
                debug!(%key, "Superseded in-flight run");
            }
        }
    }

    /// Number of runs still in flight.
    pub fn in_flight(&self) -> usize {
        let inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        inflight.values().filter(|h| !h.is_finished()).count()
    }
}
