//! Capabilities the watchdog consumes from its environment.
//!
//! Concrete implementations (a Kubernetes scale client, an HTTP prober) live
//! outside the core; tests use [`crate::memory`].

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::types::{Endpoint, ResourceRef, ResourceState};

/// Reads and patches scalable resources in a cluster namespace.
///
/// Implementations must be safe to call concurrently for distinct resources.
#[async_trait]
pub trait ScaleClient: Send + Sync {
    /// Current desired replica count of a resource.
    async fn get_replicas(&self, namespace: &str, resource: &ResourceRef) -> ApiResult<u32>;

    /// Patch the desired replica count of a resource.
    async fn set_replicas(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        replicas: u32,
    ) -> ApiResult<()>;

    /// Full observed state, used for preconditions and annotations.
    async fn get_resource_state(
        &self,
        namespace: &str,
        resource: &ResourceRef,
    ) -> ApiResult<ResourceState>;
}

/// Performs a single reachability check against a control plane endpoint.
#[async_trait]
pub trait ProbeClient: Send + Sync {
    async fn check(&self, endpoint: &Endpoint) -> ApiResult<()>;
}
