//! watchdog-controller — keeps one prober per live cluster.
//!
//! Cluster add/update/delete events are fed into
//! [`ClusterReconciler::reconcile`], which registers or unregisters the
//! cluster's [`Prober`](watchdog_prober::Prober) with the shared
//! [`ProberManager`](watchdog_prober::ProberManager).
//!
//! # Architecture
//!
//! ```text
//! cluster event (key, Option<ClusterInfo>)
//!   └── ClusterReconciler::reconcile
//!       ├── absent / deleting / hibernating → ProberManager::unregister
//!       └── running → FlowScaler + Prober → ProberManager::register
//! ```

pub mod reconciler;

pub use reconciler::{ClusterInfo, ClusterReconciler, ReconcileAction, StopReason};
