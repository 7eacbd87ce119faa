//! In-memory implementations of the client capabilities.
//!
//! Used by tests and dry runs. Failures can be scripted per resource or
//! endpoint, and every patch is recorded in call order.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::{ProbeClient, ScaleClient};
use crate::error::{ApiError, ApiResult};
use crate::types::{Endpoint, ResourceRef, ResourceState};

type ResourceKey = (String, ResourceRef);

/// One successful `set_replicas` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRecord {
    pub namespace: String,
    pub resource: ResourceRef,
    pub replicas: u32,
}

#[derive(Default)]
struct Inner {
    resources: HashMap<ResourceKey, ResourceState>,
    patch_failures: HashMap<ResourceKey, VecDeque<ApiError>>,
    patches: Vec<PatchRecord>,
    /// Attempts per resource, including failed ones.
    attempts: HashMap<ResourceKey, u32>,
}

/// Scale client backed by a map of resource states.
#[derive(Clone, Default)]
pub struct InMemoryClient {
    inner: Arc<Mutex<Inner>>,
    patch_delay: Duration,
    /// When set, `ready_replicas` stays put on patch and must be set by hand.
    manual_readiness: bool,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `set_replicas` call.
    pub fn with_patch_delay(mut self, delay: Duration) -> Self {
        self.patch_delay = delay;
        self
    }

    pub fn with_manual_readiness(mut self) -> Self {
        self.manual_readiness = true;
        self
    }

    pub async fn insert(&self, namespace: &str, resource: ResourceRef, state: ResourceState) {
        let mut inner = self.inner.lock().await;
        inner.resources.insert((namespace.to_string(), resource), state);
    }

    pub async fn remove(&self, namespace: &str, resource: &ResourceRef) {
        let mut inner = self.inner.lock().await;
        inner
            .resources
            .remove(&(namespace.to_string(), resource.clone()));
    }

    pub async fn state(&self, namespace: &str, resource: &ResourceRef) -> Option<ResourceState> {
        let inner = self.inner.lock().await;
        inner
            .resources
            .get(&(namespace.to_string(), resource.clone()))
            .cloned()
    }

    pub async fn set_ready_replicas(&self, namespace: &str, resource: &ResourceRef, ready: u32) {
        let mut inner = self.inner.lock().await;
        if let Some(state) = inner
            .resources
            .get_mut(&(namespace.to_string(), resource.clone()))
        {
            state.ready_replicas = ready;
        }
    }

    /// Queue errors returned by the next `set_replicas` calls for a resource.
    pub async fn fail_patches(&self, namespace: &str, resource: &ResourceRef, errors: Vec<ApiError>) {
        let mut inner = self.inner.lock().await;
        inner
            .patch_failures
            .entry((namespace.to_string(), resource.clone()))
            .or_default()
            .extend(errors);
    }

    /// Successful patches in the order they were applied.
    pub async fn patches(&self) -> Vec<PatchRecord> {
        self.inner.lock().await.patches.clone()
    }

    pub async fn patch_attempts(&self, namespace: &str, resource: &ResourceRef) -> u32 {
        let inner = self.inner.lock().await;
        inner
            .attempts
            .get(&(namespace.to_string(), resource.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of `set_replicas` calls observed running at once.
    pub fn max_concurrent_patches(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScaleClient for InMemoryClient {
    async fn get_replicas(&self, namespace: &str, resource: &ResourceRef) -> ApiResult<u32> {
        self.get_resource_state(namespace, resource)
            .await
            .map(|s| s.replicas)
    }

    async fn set_replicas(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        replicas: u32,
    ) -> ApiResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.patch_delay.is_zero() {
            tokio::time::sleep(self.patch_delay).await;
        }

        let result = {
            let mut inner = self.inner.lock().await;
            let key = (namespace.to_string(), resource.clone());
            *inner.attempts.entry(key.clone()).or_default() += 1;

            let scripted = inner
                .patch_failures
                .get_mut(&key)
                .and_then(|queue| queue.pop_front());

            match scripted {
                Some(err) => Err(err),
                None => match inner.resources.get_mut(&key) {
                    Some(state) => {
                        state.replicas = replicas;
                        if !self.manual_readiness {
                            state.ready_replicas = replicas;
                        }
                        inner.patches.push(PatchRecord {
                            namespace: namespace.to_string(),
                            resource: resource.clone(),
                            replicas,
                        });
                        debug!(%namespace, %resource, replicas, "in-memory patch applied");
                        Ok(())
                    }
                    None => Err(ApiError::NotFound(resource.to_string())),
                },
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get_resource_state(
        &self,
        namespace: &str,
        resource: &ResourceRef,
    ) -> ApiResult<ResourceState> {
        self.state(namespace, resource)
            .await
            .ok_or_else(|| ApiError::NotFound(resource.to_string()))
    }
}

/// Probe client returning scripted results per endpoint address.
#[derive(Clone, Default)]
pub struct ScriptedProbeClient {
    inner: Arc<Mutex<ProbeScript>>,
}

#[derive(Default)]
struct ProbeScript {
    queued: HashMap<String, VecDeque<ApiResult<()>>>,
    fallback: HashMap<String, ApiResult<()>>,
    calls: HashMap<String, usize>,
}

impl ScriptedProbeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result returned for `address` whenever nothing is queued.
    pub async fn set_result(&self, address: &str, result: ApiResult<()>) {
        let mut inner = self.inner.lock().await;
        inner.fallback.insert(address.to_string(), result);
    }

    /// Queue one-shot results for `address`, consumed before the fallback.
    pub async fn push(&self, address: &str, results: Vec<ApiResult<()>>) {
        let mut inner = self.inner.lock().await;
        inner
            .queued
            .entry(address.to_string())
            .or_default()
            .extend(results);
    }

    pub async fn calls(&self, address: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.calls.get(address).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ProbeClient for ScriptedProbeClient {
    async fn check(&self, endpoint: &Endpoint) -> ApiResult<()> {
        let mut inner = self.inner.lock().await;
        *inner.calls.entry(endpoint.address.clone()).or_default() += 1;
        if let Some(result) = inner
            .queued
            .get_mut(&endpoint.address)
            .and_then(|q| q.pop_front())
        {
            return result;
        }
        inner
            .fallback
            .get(&endpoint.address)
            .cloned()
            .unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn patch_updates_state_and_history() {
        let client = InMemoryClient::new();
        let kcm = ResourceRef::deployment("kcm");
        client.insert("shoot--a", kcm.clone(), ResourceState::with_replicas(1)).await;

        client.set_replicas("shoot--a", &kcm, 0).await.unwrap();

        assert_eq!(client.get_replicas("shoot--a", &kcm).await.unwrap(), 0);
        let patches = client.patches().await;
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].replicas, 0);
    }

    #[tokio::test]
    async fn scripted_patch_failures_are_consumed_in_order() {
        let client = InMemoryClient::new();
        let kcm = ResourceRef::deployment("kcm");
        client.insert("ns", kcm.clone(), ResourceState::with_replicas(0)).await;
        client
            .fail_patches("ns", &kcm, vec![ApiError::Other("conflict".into())])
            .await;

        assert!(client.set_replicas("ns", &kcm, 1).await.is_err());
        assert!(client.set_replicas("ns", &kcm, 1).await.is_ok());
        assert_eq!(client.patch_attempts("ns", &kcm).await, 2);
    }

    #[tokio::test]
    async fn missing_resource_is_not_found() {
        let client = InMemoryClient::new();
        let err = client
            .get_replicas("ns", &ResourceRef::deployment("ghost"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn scripted_probe_prefers_queue_over_fallback() {
        let probe = ScriptedProbeClient::new();
        let ep = Endpoint::new("10.0.0.1:443");
        probe
            .set_result("10.0.0.1:443", Err(ApiError::Other("down".into())))
            .await;
        probe.push("10.0.0.1:443", vec![Ok(())]).await;

        assert!(probe.check(&ep).await.is_ok());
        assert!(probe.check(&ep).await.is_err());
        assert_eq!(probe.calls("10.0.0.1:443").await, 2);
        // Unknown endpoints are reachable.
        assert!(probe.check(&Endpoint::new("other:443")).await.is_ok());
    }
}
