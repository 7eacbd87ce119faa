//! watchdog-prober — control plane reachability probing.
//!
//! One [`Prober`] per monitored cluster checks the internal and external
//! API endpoints on a fixed interval and scales the cluster's dependents
//! when the combined verdict changes.
//!
//! # Architecture
//!
//! ```text
//! ProberManager
//!   └── cluster key → task running Prober::run(shutdown)
//!       ├── ProbeStatus (internal)  ┐
//!       ├── ProbeStatus (external)  ┴── evaluate(VerdictPolicy) → Verdict
//!       └── DependentScaler::scale(direction) on verdict change
//! ```

pub mod http_probe;
pub mod manager;
pub mod prober;
pub mod status;
pub mod verdict;

pub use http_probe::HttpProbeClient;
pub use manager::{ProberInfo, ProberManager, RegisterOutcome};
pub use prober::Prober;
pub use status::ProbeStatus;
pub use verdict::{Thresholds, Verdict, evaluate};
