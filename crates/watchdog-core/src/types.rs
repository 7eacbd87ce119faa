//! Domain types shared by the prober and the scaler.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for one monitored control plane.
///
/// For a managed cluster this is the namespace its control plane runs in,
/// which is also the namespace the dependent resources live in.
pub type ClusterKey = String;

/// Annotation that opts a resource out of scaling by the watchdog.
pub const IGNORE_SCALING_ANNOTATION: &str = "dependency-watchdog.gardener.cloud/ignore-scaling";

// ── Resources ──────────────────────────────────────────────────────

/// Reference to a scalable resource inside a cluster namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// Resource kind, e.g. "Deployment" or "StatefulSet".
    #[serde(default = "default_kind")]
    pub kind: String,
    pub name: String,
}

fn default_kind() -> String {
    "Deployment".to_string()
}

impl ResourceRef {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn deployment(name: &str) -> Self {
        Self::new("Deployment", name)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Observed state of a dependent resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceState {
    /// Desired replicas (`spec.replicas`).
    pub replicas: u32,
    /// Replicas reporting ready (`status.readyReplicas`).
    pub ready_replicas: u32,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl ResourceState {
    pub fn with_replicas(replicas: u32) -> Self {
        Self {
            replicas,
            ready_replicas: replicas,
            annotations: HashMap::new(),
        }
    }

    /// Whether the resource carries the ignore-scaling annotation.
    pub fn ignores_scaling(&self) -> bool {
        self.annotations
            .get(IGNORE_SCALING_ANNOTATION)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

// ── Scaling ────────────────────────────────────────────────────────

/// Direction of a scaling flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleDirection {
    /// Restore dependents once the control plane is reachable again.
    ScaleUp,
    /// Shut dependents down while the control plane is unreachable.
    ScaleDown,
}

impl ScaleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleDirection::ScaleUp => "scale-up",
            ScaleDirection::ScaleDown => "scale-down",
        }
    }
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScaleDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scale-up" | "up" => Ok(ScaleDirection::ScaleUp),
            "scale-down" | "down" => Ok(ScaleDirection::ScaleDown),
            other => Err(format!("unknown scale direction: {other}")),
        }
    }
}

/// Condition a precondition resource must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// `status.readyReplicas >= count`.
    ReadyReplicasAtLeast { count: u32 },
    /// `spec.replicas >= count`.
    ReplicasAtLeast { count: u32 },
    /// `spec.replicas <= count`.
    ReplicasAtMost { count: u32 },
    /// The resource exists.
    Exists,
}

impl Condition {
    /// Evaluate against an observed state; `None` means the resource is absent.
    pub fn is_satisfied(&self, state: Option<&ResourceState>) -> bool {
        match (self, state) {
            (Condition::Exists, state) => state.is_some(),
            (_, None) => false,
            (Condition::ReadyReplicasAtLeast { count }, Some(s)) => s.ready_replicas >= *count,
            (Condition::ReplicasAtLeast { count }, Some(s)) => s.replicas >= *count,
            (Condition::ReplicasAtMost { count }, Some(s)) => s.replicas <= *count,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::ReadyReplicasAtLeast { count } => write!(f, "readyReplicas >= {count}"),
            Condition::ReplicasAtLeast { count } => write!(f, "replicas >= {count}"),
            Condition::ReplicasAtMost { count } => write!(f, "replicas <= {count}"),
            Condition::Exists => f.write_str("exists"),
        }
    }
}

/// Wait-for-condition check performed before scaling a resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Precondition {
    pub resource: ResourceRef,
    pub condition: Condition,
    /// Restrict the check to one direction; both when unset.
    #[serde(default)]
    pub direction: Option<ScaleDirection>,
}

impl Precondition {
    pub fn applies_to(&self, direction: ScaleDirection) -> bool {
        self.direction.is_none_or(|d| d == direction)
    }
}

// ── Probing ────────────────────────────────────────────────────────

/// One of the two reachability paths probed per cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// In-cluster path to the API server (service / cluster DNS).
    Internal,
    /// The path used by nodes and users (load balancer / ingress).
    External,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Internal => f.write_str("internal"),
            Channel::External => f.write_str("external"),
        }
    }
}

/// A probe target: `host:port` plus the HTTP path to request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    #[serde(default = "default_probe_path")]
    pub path: String,
}

fn default_probe_path() -> String {
    "/healthz".to_string()
}

impl Endpoint {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            path: default_probe_path(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.address, self.path)
    }
}

/// Internal and external endpoints of one monitored control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeEndpoints {
    pub internal: Endpoint,
    pub external: Endpoint,
}

impl ProbeEndpoints {
    pub fn get(&self, channel: Channel) -> &Endpoint {
        match channel {
            Channel::Internal => &self.internal,
            Channel::External => &self.external,
        }
    }
}
