//! Prober manager — at most one running prober per cluster key.
//!
//! Every registered [`Prober`] runs in its own task with its own shutdown
//! channel. Unregistering signals the task and forgets it; a scaling flow
//! already in progress is allowed to finish.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use watchdog_core::ClusterKey;

use crate::prober::Prober;

/// Result of [`ProberManager::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Started,
    /// A live prober already exists for the key; the new one was dropped.
    AlreadyRunning,
    /// The configured maximum number of probers is reached.
    AtCapacity,
}

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProberInfo {
    pub key: ClusterKey,
    pub started_at: Instant,
}

struct ProberSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    started_at: Instant,
}

impl ProberSlot {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

#[derive(Clone, Default)]
pub struct ProberManager {
    probers: Arc<RwLock<HashMap<ClusterKey, ProberSlot>>>,
    max_probers: Option<usize>,
}

impl ProberManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of concurrently running probers.
    pub fn with_max_probers(mut self, max: Option<usize>) -> Self {
        self.max_probers = max;
        self
    }

    /// Start `prober` unless a live one is already registered under its key.
    pub async fn register(&self, prober: Prober) -> RegisterOutcome {
        let key = prober.key().to_string();
        let mut probers = self.probers.write().await;

        if let Some(slot) = probers.get(&key) {
            if slot.is_live() {
                debug!(cluster = %key, "prober already running");
                return RegisterOutcome::AlreadyRunning;
            }
            debug!(cluster = %key, "replacing finished prober");
            probers.remove(&key);
        }

        if let Some(max) = self.max_probers {
            let live = probers.values().filter(|s| s.is_live()).count();
            if live >= max {
                warn!(cluster = %key, max, "prober limit reached, not starting");
                return RegisterOutcome::AtCapacity;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(prober.run(shutdown_rx));
        probers.insert(
            key.clone(),
            ProberSlot {
                handle,
                shutdown_tx,
                started_at: Instant::now(),
            },
        );

        info!(cluster = %key, "prober registered");
        RegisterOutcome::Started
    }

    /// Signal the prober for `key` to stop and forget it.
    ///
    /// Returns whether a prober was registered under the key.
    pub async fn unregister(&self, key: &str) -> bool {
        let mut probers = self.probers.write().await;
        match probers.remove(key) {
            Some(slot) => {
                let _ = slot.shutdown_tx.send(true);
                info!(cluster = %key, "prober unregistered");
                true
            }
            None => false,
        }
    }

    /// The live prober for `key`, if any. Entries whose loop already ended
    /// are not reported.
    pub async fn get(&self, key: &str) -> Option<ProberInfo> {
        let probers = self.probers.read().await;
        probers
            .get(key)
            .filter(|slot| slot.is_live())
            .map(|slot| ProberInfo {
                key: key.to_string(),
                started_at: slot.started_at,
            })
    }

    pub async fn is_running(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Keys of all live probers, sorted.
    pub async fn keys(&self) -> Vec<ClusterKey> {
        let probers = self.probers.read().await;
        let mut keys: Vec<_> = probers
            .iter()
            .filter(|(_, slot)| slot.is_live())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        let probers = self.probers.read().await;
        probers.values().filter(|s| s.is_live()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop every prober and wait for their loops to exit.
    pub async fn stop_all(&self) {
        let slots: Vec<_> = {
            let mut probers = self.probers.write().await;
            probers.drain().collect()
        };
        for (_, slot) in &slots {
            let _ = slot.shutdown_tx.send(true);
        }
        for (key, slot) in slots {
            if let Err(e) = slot.handle.await {
                warn!(cluster = %key, error = %e, "prober task ended abnormally");
            }
        }
        info!("all probers stopped");
    }
}
