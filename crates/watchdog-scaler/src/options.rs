//! Tunables for resource checks and scale patch retries.

use std::time::Duration;

use watchdog_core::{ScalingConfig, StepFailurePolicy};

pub const DEFAULT_RESOURCE_CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_RESOURCE_CHECK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SCALE_RESOURCE_BACKOFF: Duration = Duration::from_millis(100);
pub const DEFAULT_SCALE_RETRY_ATTEMPTS: u32 = 5;

/// Upper bound for the doubling patch retry backoff.
pub const MAX_SCALE_RESOURCE_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalerOptions {
    /// How long to wait for a precondition before failing the task.
    pub resource_check_timeout: Duration,
    /// Poll interval while waiting for a precondition.
    pub resource_check_interval: Duration,
    /// First retry delay after a failed scale patch.
    pub scale_resource_backoff: Duration,
    /// Total patch attempts, including the first.
    pub scale_retry_attempts: u32,
    pub step_failure_policy: StepFailurePolicy,
}

impl Default for ScalerOptions {
    fn default() -> Self {
        Self {
            resource_check_timeout: DEFAULT_RESOURCE_CHECK_TIMEOUT,
            resource_check_interval: DEFAULT_RESOURCE_CHECK_INTERVAL,
            scale_resource_backoff: DEFAULT_SCALE_RESOURCE_BACKOFF,
            scale_retry_attempts: DEFAULT_SCALE_RETRY_ATTEMPTS,
            step_failure_policy: StepFailurePolicy::default(),
        }
    }
}

impl ScalerOptions {
    pub fn from_config(config: &ScalingConfig) -> Self {
        Self {
            resource_check_timeout: config.resource_check_timeout,
            resource_check_interval: config.resource_check_interval,
            scale_resource_backoff: config.scale_resource_backoff,
            scale_retry_attempts: config.scale_retry_attempts.max(1),
            step_failure_policy: config.step_failure_policy,
        }
    }

    pub fn with_resource_check_timeout(mut self, timeout: Duration) -> Self {
        self.resource_check_timeout = timeout;
        self
    }

    pub fn with_resource_check_interval(mut self, interval: Duration) -> Self {
        self.resource_check_interval = interval;
        self
    }

    pub fn with_scale_resource_backoff(mut self, backoff: Duration) -> Self {
        self.scale_resource_backoff = backoff;
        self
    }

    pub fn with_scale_retry_attempts(mut self, attempts: u32) -> Self {
        self.scale_retry_attempts = attempts.max(1);
        self
    }

    pub fn with_step_failure_policy(mut self, policy: StepFailurePolicy) -> Self {
        self.step_failure_policy = policy;
        self
    }

    /// Delay before retry number `attempt` (1-based), doubling from the base.
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.scale_resource_backoff
            .saturating_mul(factor)
            .min(MAX_SCALE_RESOURCE_BACKOFF)
    }
}
