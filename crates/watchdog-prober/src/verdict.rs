//! Combining the two channel statuses into a cluster verdict.

use std::fmt;

use watchdog_core::{ScaleDirection, VerdictPolicy};

use crate::status::ProbeStatus;

/// What the prober currently believes about a cluster's control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    /// No threshold has been crossed yet since the prober started.
    #[default]
    Unknown,
    Healthy,
    Unreachable,
}

impl Verdict {
    /// Direction to scale dependents in when the verdict becomes `self`.
    pub fn scale_direction(&self) -> Option<ScaleDirection> {
        match self {
            Verdict::Unknown => None,
            Verdict::Healthy => Some(ScaleDirection::ScaleUp),
            Verdict::Unreachable => Some(ScaleDirection::ScaleDown),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Unknown => "unknown",
            Verdict::Healthy => "healthy",
            Verdict::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// Thresholds shared by both channels.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub success: u32,
    pub failure: u32,
}

/// Evaluate the channel statuses under `policy`.
///
/// Returns the verdict the statuses currently support, or `None` when they
/// are mixed or below threshold, in which case the previous verdict holds.
pub fn evaluate(
    policy: VerdictPolicy,
    internal: &ProbeStatus,
    external: &ProbeStatus,
    thresholds: Thresholds,
) -> Option<Verdict> {
    let healthy = |s: &ProbeStatus| s.is_healthy(thresholds.success);
    let unhealthy = |s: &ProbeStatus| s.is_unhealthy(thresholds.failure);

    match policy {
        VerdictPolicy::BothChannels => {
            if unhealthy(internal) && unhealthy(external) {
                Some(Verdict::Unreachable)
            } else if healthy(internal) && healthy(external) {
                Some(Verdict::Healthy)
            } else {
                None
            }
        }
        VerdictPolicy::AnyChannel => {
            if unhealthy(internal) || unhealthy(external) {
                Some(Verdict::Unreachable)
            } else if healthy(internal) && healthy(external) {
                Some(Verdict::Healthy)
            } else {
                None
            }
        }
        VerdictPolicy::ExternalGated => {
            // The external channel only counts while the internal one works.
            if !healthy(internal) {
                None
            } else if unhealthy(external) {
                Some(Verdict::Unreachable)
            } else if healthy(external) {
                Some(Verdict::Healthy)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use watchdog_core::ApiError;

    const T: Thresholds = Thresholds {
        success: 1,
        failure: 2,
    };

    fn healthy() -> ProbeStatus {
        let mut s = ProbeStatus::new();
        s.record_success(T.success);
        s
    }

    fn unhealthy() -> ProbeStatus {
        let mut s = ProbeStatus::new();
        for _ in 0..T.failure {
            s.record_failure(ApiError::Other("down".into()), T.failure, Duration::ZERO);
        }
        s
    }

    fn pending() -> ProbeStatus {
        let mut s = ProbeStatus::new();
        s.record_failure(ApiError::Other("down".into()), T.failure, Duration::ZERO);
        s
    }

    #[test]
    fn both_channels_requires_agreement() {
        let p = VerdictPolicy::BothChannels;
        assert_eq!(evaluate(p, &unhealthy(), &unhealthy(), T), Some(Verdict::Unreachable));
        assert_eq!(evaluate(p, &healthy(), &healthy(), T), Some(Verdict::Healthy));
        assert_eq!(evaluate(p, &healthy(), &unhealthy(), T), None);
        assert_eq!(evaluate(p, &unhealthy(), &healthy(), T), None);
    }

    #[test]
    fn any_channel_trips_on_either() {
        let p = VerdictPolicy::AnyChannel;
        assert_eq!(evaluate(p, &healthy(), &unhealthy(), T), Some(Verdict::Unreachable));
        assert_eq!(evaluate(p, &unhealthy(), &pending(), T), Some(Verdict::Unreachable));
        assert_eq!(evaluate(p, &healthy(), &pending(), T), None);
        assert_eq!(evaluate(p, &healthy(), &healthy(), T), Some(Verdict::Healthy));
    }

    #[test]
    fn external_gated_ignores_external_while_internal_down() {
        let p = VerdictPolicy::ExternalGated;
        assert_eq!(evaluate(p, &unhealthy(), &unhealthy(), T), None);
        assert_eq!(evaluate(p, &pending(), &healthy(), T), None);
        assert_eq!(evaluate(p, &healthy(), &unhealthy(), T), Some(Verdict::Unreachable));
        assert_eq!(evaluate(p, &healthy(), &healthy(), T), Some(Verdict::Healthy));
    }

    #[test]
    fn below_threshold_keeps_previous() {
        for p in [
            VerdictPolicy::BothChannels,
            VerdictPolicy::AnyChannel,
            VerdictPolicy::ExternalGated,
        ] {
            assert_eq!(evaluate(p, &ProbeStatus::new(), &ProbeStatus::new(), T), None);
        }
    }

    #[test]
    fn verdict_maps_to_direction() {
        assert_eq!(Verdict::Unknown.scale_direction(), None);
        assert_eq!(Verdict::Healthy.scale_direction(), Some(ScaleDirection::ScaleUp));
        assert_eq!(Verdict::Unreachable.scale_direction(), Some(ScaleDirection::ScaleDown));
    }
}
