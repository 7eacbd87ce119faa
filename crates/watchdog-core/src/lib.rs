//! watchdog-core — shared types for the dependency watchdog.
//!
//! Holds the configuration model (`watchdog.toml`), the domain types passed
//! between the prober and the scaler, and the client capabilities the
//! watchdog consumes from its environment:
//!
//! ```text
//! WatchdogConfig
//!   ├── ProbeConfig   (thresholds, interval, backoffs, verdict policy)
//!   ├── ScalingConfig (resource checks, patch retries, step failure policy)
//!   └── [DependentResourceInfo] (name, level, replica targets, precondition)
//!
//! ScaleClient  get_replicas / set_replicas / get_resource_state
//! ProbeClient  check(endpoint)
//! ```

pub mod client;
pub mod config;
pub mod duration;
pub mod error;
pub mod memory;
pub mod types;

pub use client::{ProbeClient, ScaleClient};
pub use config::{
    DependentResourceInfo, ProbeConfig, ScalingConfig, StepFailurePolicy, VerdictPolicy,
    WatchdogConfig,
};
pub use error::{ApiError, ApiResult, ConfigError};
pub use types::*;
