//! Cluster reconciler — maps cluster lifecycle events to prober registration.
//!
//! A cluster is probed while it exists, is not being deleted and is neither
//! hibernated nor on its way into or out of hibernation. In every other
//! state any prober for it is stopped.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use watchdog_core::{ClusterKey, ProbeClient, ProbeEndpoints, ScaleClient, WatchdogConfig};
use watchdog_prober::{Prober, ProberManager, RegisterOutcome};
use watchdog_scaler::{FlowScaler, ScalerOptions};

/// The cluster state the reconciler decides on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Display name of the cluster; the reconcile key is its namespace.
    pub name: String,
    pub deletion_requested: bool,
    /// Hibernation is requested in the cluster's desired state.
    pub hibernation_enabled: bool,
    /// The cluster is still hibernated (for example while waking up).
    pub is_hibernated: bool,
    pub endpoints: ProbeEndpoints,
}

impl ClusterInfo {
    /// An awake cluster with no pending deletion.
    pub fn running(name: &str, endpoints: ProbeEndpoints) -> Self {
        Self {
            name: name.to_string(),
            deletion_requested: false,
            hibernation_enabled: false,
            is_hibernated: false,
            endpoints,
        }
    }
}

/// Why monitoring was stopped for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NotFound,
    Deleting,
    HibernationEnabled,
    Hibernated,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::NotFound => "cluster not found",
            StopReason::Deleting => "cluster marked for deletion",
            StopReason::HibernationEnabled => "hibernation enabled",
            StopReason::Hibernated => "cluster still hibernated",
        };
        f.write_str(s)
    }
}

/// What a call to [`ClusterReconciler::reconcile`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Started,
    AlreadyMonitoring,
    /// The prober limit is reached; the cluster is not monitored.
    AtCapacity,
    Stopped {
        reason: StopReason,
        /// Whether a prober was registered before this call.
        was_running: bool,
    },
}

pub struct ClusterReconciler {
    manager: Arc<ProberManager>,
    config: Arc<WatchdogConfig>,
    scale_client: Arc<dyn ScaleClient>,
    probe_client: Arc<dyn ProbeClient>,
}

impl ClusterReconciler {
    pub fn new(
        manager: Arc<ProberManager>,
        config: Arc<WatchdogConfig>,
        scale_client: Arc<dyn ScaleClient>,
        probe_client: Arc<dyn ProbeClient>,
    ) -> Self {
        Self {
            manager,
            config,
            scale_client,
            probe_client,
        }
    }

    pub fn manager(&self) -> &ProberManager {
        &self.manager
    }

    /// Bring monitoring for `key` in line with `cluster`; `None` means the
    /// cluster no longer exists.
    pub async fn reconcile(&self, key: &str, cluster: Option<&ClusterInfo>) -> ReconcileAction {
        let cluster = match cluster {
            None => return self.stop_for(key, None, StopReason::NotFound).await,
            Some(c) => c,
        };
        if cluster.deletion_requested {
            return self.stop_for(key, Some(&cluster.name), StopReason::Deleting).await;
        }
        if cluster.hibernation_enabled {
            return self.stop_for(key, Some(&cluster.name), StopReason::HibernationEnabled).await;
        }
        if cluster.is_hibernated {
            return self.stop_for(key, Some(&cluster.name), StopReason::Hibernated).await;
        }

        match self.start_monitoring(key, &cluster.endpoints).await {
            RegisterOutcome::Started => {
                info!(cluster = %key, name = %cluster.name, "started monitoring");
                ReconcileAction::Started
            }
            RegisterOutcome::AlreadyRunning => ReconcileAction::AlreadyMonitoring,
            RegisterOutcome::AtCapacity => ReconcileAction::AtCapacity,
        }
    }

    /// Start a prober for `key` unless a live one exists.
    pub async fn start_monitoring(&self, key: &str, endpoints: &ProbeEndpoints) -> RegisterOutcome {
        if self.manager.is_running(key).await {
            debug!(cluster = %key, "prober already present");
            return RegisterOutcome::AlreadyRunning;
        }

        let scaler = FlowScaler::new(
            key,
            Arc::clone(&self.scale_client),
            ScalerOptions::from_config(&self.config.scaling),
            self.config.dependent_resources.clone(),
        );
        let prober = Prober::new(
            key,
            Arc::new(self.config.probe.clone()),
            endpoints.clone(),
            Arc::clone(&self.probe_client),
            Arc::new(scaler),
        );
        self.manager.register(prober).await
    }

    /// Stop the prober for `key`. Returns whether one was running.
    pub async fn stop_monitoring(&self, key: &str) -> bool {
        self.manager.unregister(key).await
    }

    async fn stop_for(
        &self,
        key: &str,
        name: Option<&str>,
        reason: StopReason,
    ) -> ReconcileAction {
        let was_running = self.stop_monitoring(key).await;
        let name = name.unwrap_or("-");
        if was_running {
            info!(cluster = %key, %name, %reason, "stopped monitoring");
        } else {
            debug!(cluster = %key, %name, %reason, "nothing to stop");
        }
        ReconcileAction::Stopped {
            reason,
            was_running,
        }
    }

    /// Keys of all clusters currently monitored.
    pub async fn monitored(&self) -> Vec<ClusterKey> {
        self.manager.keys().await
    }
}
