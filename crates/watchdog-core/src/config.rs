//! watchdog.toml configuration parser.
//!
//! ```toml
//! [probe]
//! interval = "10s"
//! failure_threshold = 3
//! verdict_policy = "both_channels"
//!
//! [scaling]
//! resource_check_timeout = "5m"
//! step_failure_policy = "abort"
//!
//! [[dependent_resources]]
//! name = "kube-controller-manager"
//! level = 0
//! scale_up_replicas = 1
//! scale_down_replicas = 0
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::duration::serde_duration;
use crate::error::ConfigError;
use crate::types::{Precondition, ResourceRef, ScaleDirection};

/// Longest duration any setting may hold.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

static RESOURCE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9.]*[a-z0-9])?$").expect("static regex is valid")
});

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WatchdogConfig {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub dependent_resources: Vec<DependentResourceInfo>,
}

/// How the internal and external channel states combine into one verdict.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerdictPolicy {
    /// Unreachable only when both channels are unhealthy.
    #[default]
    BothChannels,
    /// Unreachable as soon as either channel is unhealthy.
    AnyChannel,
    /// Unreachable when the internal channel is healthy but the external one
    /// is not. An internal outage means the API server itself is down, so
    /// nothing is scaled.
    ExternalGated,
}

/// What a flow does with later steps once a step has a failed task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepFailurePolicy {
    /// Stop; remaining steps are reported as skipped.
    #[default]
    Abort,
    /// Keep going through every level.
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    #[serde(with = "serde_duration")]
    pub interval: Duration,
    /// Timeout for a single reachability check.
    #[serde(with = "serde_duration")]
    pub timeout: Duration,
    pub success_threshold: u32,
    pub failure_threshold: u32,
    /// Channel backoff armed once the failure threshold is reached.
    #[serde(with = "serde_duration")]
    pub failure_backoff: Duration,
    /// Channel backoff armed when the endpoint throttles us.
    #[serde(with = "serde_duration")]
    pub throttled_backoff: Duration,
    pub verdict_policy: VerdictPolicy,
    /// Upper bound on concurrently running probers; unlimited when unset.
    pub max_monitors: Option<usize>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            success_threshold: 1,
            failure_threshold: 3,
            failure_backoff: Duration::from_secs(30),
            throttled_backoff: Duration::from_secs(10),
            verdict_policy: VerdictPolicy::default(),
            max_monitors: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    #[serde(with = "serde_duration")]
    pub resource_check_interval: Duration,
    #[serde(with = "serde_duration")]
    pub resource_check_timeout: Duration,
    /// Initial delay between scale patch retries; doubles per attempt.
    #[serde(with = "serde_duration")]
    pub scale_resource_backoff: Duration,
    pub scale_retry_attempts: u32,
    pub step_failure_policy: StepFailurePolicy,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            resource_check_interval: Duration::from_secs(5),
            resource_check_timeout: Duration::from_secs(5 * 60),
            scale_resource_backoff: Duration::from_millis(100),
            scale_retry_attempts: 5,
            step_failure_policy: StepFailurePolicy::default(),
        }
    }
}

/// A scalable component that depends on the monitored control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependentResourceInfo {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Dependency order: lower levels scale up first and down last.
    pub level: u32,
    #[serde(default)]
    pub scale_up_replicas: Option<u32>,
    #[serde(default)]
    pub scale_down_replicas: Option<u32>,
    /// When false a missing resource is skipped instead of failing the task.
    #[serde(default = "default_true")]
    pub should_exist: bool,
    #[serde(default, with = "serde_duration::option")]
    pub initial_delay: Option<Duration>,
    /// Overrides `scaling.resource_check_timeout` for this resource.
    #[serde(default, with = "serde_duration::option")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub precondition: Option<Precondition>,
}

fn default_kind() -> String {
    "Deployment".to_string()
}

fn default_true() -> bool {
    true
}

impl DependentResourceInfo {
    /// A deployment at `level` with no replica targets.
    pub fn new(name: &str, level: u32) -> Self {
        Self {
            name: name.to_string(),
            kind: default_kind(),
            level,
            scale_up_replicas: None,
            scale_down_replicas: None,
            should_exist: true,
            initial_delay: None,
            timeout: None,
            precondition: None,
        }
    }

    pub fn scale_up_to(mut self, replicas: u32) -> Self {
        self.scale_up_replicas = Some(replicas);
        self
    }

    pub fn scale_down_to(mut self, replicas: u32) -> Self {
        self.scale_down_replicas = Some(replicas);
        self
    }

    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    pub fn optional(mut self) -> Self {
        self.should_exist = false;
        self
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(&self.kind, &self.name)
    }

    /// Replica target for `direction`, if one is configured.
    pub fn target_replicas(&self, direction: ScaleDirection) -> Option<u32> {
        match direction {
            ScaleDirection::ScaleUp => self.scale_up_replicas,
            ScaleDirection::ScaleDown => self.scale_down_replicas,
        }
    }
}

fn check_max(field: &str, d: Duration) -> Result<(), ConfigError> {
    if d > MAX_DURATION {
        return Err(ConfigError::DurationTooLong {
            field: field.to_string(),
            max: MAX_DURATION,
        });
    }
    Ok(())
}

impl WatchdogConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: WatchdogConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.success_threshold == 0 {
            return Err(ConfigError::ZeroThreshold {
                field: "probe.success_threshold",
            });
        }
        if self.probe.failure_threshold == 0 {
            return Err(ConfigError::ZeroThreshold {
                field: "probe.failure_threshold",
            });
        }
        if self.probe.interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "probe.interval",
            });
        }
        if self.scaling.resource_check_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "scaling.resource_check_interval",
            });
        }
        if self.scaling.scale_retry_attempts == 0 {
            return Err(ConfigError::ZeroThreshold {
                field: "scaling.scale_retry_attempts",
            });
        }
        check_max("probe.interval", self.probe.interval)?;
        check_max("probe.timeout", self.probe.timeout)?;
        check_max("probe.failure_backoff", self.probe.failure_backoff)?;
        check_max("probe.throttled_backoff", self.probe.throttled_backoff)?;
        check_max(
            "scaling.resource_check_interval",
            self.scaling.resource_check_interval,
        )?;
        check_max(
            "scaling.resource_check_timeout",
            self.scaling.resource_check_timeout,
        )?;
        check_max(
            "scaling.scale_resource_backoff",
            self.scaling.scale_resource_backoff,
        )?;

        let mut seen = HashSet::new();
        for info in &self.dependent_resources {
            if !RESOURCE_NAME.is_match(&info.name) {
                return Err(ConfigError::InvalidName(info.name.clone()));
            }
            if !seen.insert(info.name.as_str()) {
                return Err(ConfigError::DuplicateResource(info.name.clone()));
            }
            if let Some(pre) = &info.precondition
                && pre.resource == info.reference()
            {
                return Err(ConfigError::SelfPrecondition(info.name.clone()));
            }
            if let Some(d) = info.initial_delay {
                check_max(&format!("{}.initial_delay", info.name), d)?;
            }
            if let Some(d) = info.timeout {
                check_max(&format!("{}.timeout", info.name), d)?;
            }
        }
        Ok(())
    }

    /// Scaffold a config with the usual controllers of a managed cluster.
    pub fn scaffold() -> Self {
        WatchdogConfig {
            probe: ProbeConfig::default(),
            scaling: ScalingConfig::default(),
            dependent_resources: vec![
                DependentResourceInfo::new("kube-controller-manager", 0)
                    .scale_up_to(1)
                    .scale_down_to(0),
                DependentResourceInfo::new("machine-controller-manager", 1)
                    .scale_up_to(1)
                    .scale_down_to(0),
                DependentResourceInfo::new("cluster-autoscaler", 2)
                    .scale_up_to(1)
                    .scale_down_to(0)
                    .optional(),
            ],
        }
    }
}
