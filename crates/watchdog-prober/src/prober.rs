//! Prober — periodic reachability checks for one cluster's control plane.
//!
//! Each cycle checks the internal and the external endpoint, folds the
//! results into the per-channel [`ProbeStatus`] and evaluates the verdict.
//! A verdict transition scales the cluster's dependents once; repeated cycles
//! with the same verdict do nothing.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use watchdog_core::{
    ApiError, Channel, ClusterKey, ProbeClient, ProbeConfig, ProbeEndpoints, VerdictPolicy,
};
use watchdog_scaler::DependentScaler;

use crate::status::ProbeStatus;
use crate::verdict::{Thresholds, Verdict, evaluate};

pub struct Prober {
    key: ClusterKey,
    config: Arc<ProbeConfig>,
    endpoints: ProbeEndpoints,
    client: Arc<dyn ProbeClient>,
    scaler: Arc<dyn DependentScaler>,
    internal: ProbeStatus,
    external: ProbeStatus,
    verdict: Verdict,
}

impl Prober {
    pub fn new(
        key: &str,
        config: Arc<ProbeConfig>,
        endpoints: ProbeEndpoints,
        client: Arc<dyn ProbeClient>,
        scaler: Arc<dyn DependentScaler>,
    ) -> Self {
        Self {
            key: key.to_string(),
            config,
            endpoints,
            client,
            scaler,
            internal: ProbeStatus::new(),
            external: ProbeStatus::new(),
            verdict: Verdict::Unknown,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn endpoints(&self) -> &ProbeEndpoints {
        &self.endpoints
    }

    pub fn status(&self, channel: Channel) -> &ProbeStatus {
        match channel {
            Channel::Internal => &self.internal,
            Channel::External => &self.external,
        }
    }

    fn thresholds(&self) -> Thresholds {
        Thresholds {
            success: self.config.success_threshold,
            failure: self.config.failure_threshold,
        }
    }

    /// Run a single probe cycle.
    ///
    /// Returns the new verdict when this cycle changed it. The dependents
    /// flow for that transition has already run by the time this returns.
    pub async fn probe_once(&mut self) -> Option<Verdict> {
        self.probe_channel(Channel::Internal).await;

        let gated = self.config.verdict_policy == VerdictPolicy::ExternalGated
            && !self.internal.is_healthy(self.config.success_threshold);
        if gated {
            debug!(cluster = %self.key, "internal channel not healthy, skipping external probe");
        } else {
            self.probe_channel(Channel::External).await;
        }

        let candidate = evaluate(
            self.config.verdict_policy,
            &self.internal,
            &self.external,
            self.thresholds(),
        )?;
        if candidate == self.verdict {
            return None;
        }

        let previous = std::mem::replace(&mut self.verdict, candidate);
        info!(cluster = %self.key, from = %previous, to = %candidate, "verdict changed");

        if let Some(direction) = candidate.scale_direction() {
            let report = self.scaler.scale(direction).await;
            if report.is_success() {
                info!(cluster = %self.key, %direction, steps = report.steps.len(), "dependents scaled");
            } else {
                for (resource, err) in report.failed_resources() {
                    error!(cluster = %self.key, %direction, %resource, error = %err, "failed to scale dependent");
                }
                for task in report.skipped_steps() {
                    warn!(cluster = %self.key, %direction, task = %task, "scaling step skipped");
                }
            }
        }

        Some(candidate)
    }

    async fn probe_channel(&mut self, channel: Channel) {
        let config = Arc::clone(&self.config);
        let status = match channel {
            Channel::Internal => &mut self.internal,
            Channel::External => &mut self.external,
        };
        if status.is_backed_off(Instant::now()) {
            debug!(cluster = %self.key, %channel, "channel backed off, skipping probe");
            return;
        }

        let endpoint = self.endpoints.get(channel);
        let result = match tokio::time::timeout(config.timeout, self.client.check(endpoint)).await
        {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(format!(
                "no response from {endpoint} within {:?}",
                config.timeout
            ))),
        };

        match result {
            Ok(()) => status.record_success(config.success_threshold),
            Err(err) if ProbeStatus::can_ignore(&err) => {
                debug!(cluster = %self.key, %channel, error = %err, "ignoring probe error");
                status.handle_ignorable(&err, config.throttled_backoff);
            }
            Err(err) => {
                debug!(cluster = %self.key, %channel, %endpoint, error = %err, "probe failed");
                status.record_failure(err, config.failure_threshold, config.failure_backoff);
            }
        }
    }

    /// Probe every `interval` until `shutdown` fires or its sender is dropped.
    ///
    /// Shutdown is observed between cycles, so a flow started by the current
    /// cycle runs to completion first.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(cluster = %self.key, interval = ?self.config.interval, "prober started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    self.probe_once().await;
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        info!(cluster = %self.key, verdict = %self.verdict, "prober stopped");
    }
}
