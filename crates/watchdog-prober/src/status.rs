//! Per-channel probe bookkeeping.
//!
//! Counts consecutive successes and failures for one reachability channel.
//! Both counters saturate at their threshold, and at most one of them is
//! non-zero at any time. Backoff is a not-before instant checked at the top
//! of each probe cycle.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use watchdog_core::ApiError;

/// Used instead of a backoff too long to be represented as an instant.
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
pub struct ProbeStatus {
    success_count: u32,
    error_count: u32,
    last_error: Option<ApiError>,
    backoff_until: Option<Instant>,
}

impl ProbeStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful check. Clears errors and any pending backoff.
    pub fn record_success(&mut self, success_threshold: u32) {
        self.error_count = 0;
        self.last_error = None;
        if self.success_count < success_threshold {
            self.success_count += 1;
        }
        self.backoff_until = None;
    }

    /// Record a counted failure. Arms `backoff` once the threshold is reached.
    pub fn record_failure(&mut self, err: ApiError, failure_threshold: u32, backoff: Duration) {
        if self.error_count < failure_threshold {
            self.error_count += 1;
        }
        self.last_error = Some(err);
        self.success_count = 0;
        if self.is_unhealthy(failure_threshold) {
            self.reset_backoff(backoff);
        }
    }

    /// Errors that must not count towards health: rejected credentials
    /// (expected while they rotate) and throttling by the endpoint.
    pub fn can_ignore(err: &ApiError) -> bool {
        err.is_auth() || err.is_throttled()
    }

    /// Back off briefly when the endpoint throttles us. Counters are untouched.
    pub fn handle_ignorable(&mut self, err: &ApiError, throttled_backoff: Duration) {
        if err.is_throttled() {
            debug!(?throttled_backoff, "endpoint throttled requests, backing off");
            self.reset_backoff(throttled_backoff);
        }
    }

    pub fn is_healthy(&self, success_threshold: u32) -> bool {
        self.success_count >= success_threshold
    }

    pub fn is_unhealthy(&self, failure_threshold: u32) -> bool {
        self.error_count >= failure_threshold
    }

    /// Whether checks for this channel should be skipped at `now`.
    pub fn is_backed_off(&self, now: Instant) -> bool {
        self.backoff_until.is_some_and(|until| now < until)
    }

    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    pub fn backoff_until(&self) -> Option<Instant> {
        self.backoff_until
    }

    fn reset_backoff(&mut self, d: Duration) {
        if d.is_zero() {
            self.backoff_until = None;
            return;
        }
        let now = Instant::now();
        self.backoff_until = now.checked_add(d).or_else(|| now.checked_add(MAX_BACKOFF));
    }
}
