//! Resource scaler — scales one dependent resource in one direction.
//!
//! ```text
//! scale(info, direction)
//!   ├── initial delay (optional)
//!   ├── lookup (retried): missing + optional → skip, ignore-scaling annotation → skip
//!   ├── precondition: poll until satisfied or timeout (task failure)
//!   ├── target replicas: none configured → no-op
//!   └── patch with doubling backoff; not-found / auth errors are terminal
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use watchdog_core::{
    ApiError, ApiResult, DependentResourceInfo, Precondition, ResourceRef, ScaleClient,
    ScaleDirection,
};

use crate::error::{ScaleError, ScaleResult};
use crate::options::ScalerOptions;

/// Why a resource was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Resource does not exist and is marked optional.
    NotFound,
    /// Resource carries the ignore-scaling annotation.
    IgnoreAnnotation,
}

/// Successful result of a scale task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleOutcome {
    Scaled { from: u32, to: u32 },
    /// Already at (or past) the target for this direction.
    Unchanged { replicas: u32 },
    /// No replica target configured for this direction.
    NoTarget,
    Skipped(SkipReason),
}

/// Whether `current` still has to move towards `target` in `direction`.
///
/// Scale-up never lowers a count and scale-down never raises one, so a
/// resource scaled further by someone else is left as is.
pub fn needs_scaling(direction: ScaleDirection, current: u32, target: u32) -> bool {
    match direction {
        ScaleDirection::ScaleUp => current < target,
        ScaleDirection::ScaleDown => current > target,
    }
}

pub struct ResourceScaler {
    client: Arc<dyn ScaleClient>,
    namespace: String,
    options: ScalerOptions,
}

impl ResourceScaler {
    pub fn new(client: Arc<dyn ScaleClient>, namespace: &str, options: ScalerOptions) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            options,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn options(&self) -> &ScalerOptions {
        &self.options
    }

    /// Scale one resource. Errors are terminal for this task only.
    pub async fn scale(
        &self,
        info: &DependentResourceInfo,
        direction: ScaleDirection,
    ) -> ScaleResult<ScaleOutcome> {
        let resource = info.reference();

        if let Some(delay) = info.initial_delay
            && !delay.is_zero()
        {
            debug!(namespace = %self.namespace, %resource, ?delay, "waiting initial delay");
            tokio::time::sleep(delay).await;
        }

        let state = self
            .read_with_retry(&resource, || {
                self.client.get_resource_state(&self.namespace, &resource)
            })
            .await;
        match state {
            Ok(state) if state.ignores_scaling() => {
                info!(
                    namespace = %self.namespace,
                    %resource,
                    "ignore-scaling annotation set, skipping"
                );
                return Ok(ScaleOutcome::Skipped(SkipReason::IgnoreAnnotation));
            }
            Ok(_) => {}
            Err(ApiError::NotFound(_)) if !info.should_exist => {
                debug!(namespace = %self.namespace, %resource, "optional resource absent, skipping");
                return Ok(ScaleOutcome::Skipped(SkipReason::NotFound));
            }
            Err(ApiError::NotFound(_)) => return Err(ScaleError::NotFound { resource }),
            Err(source) => return Err(ScaleError::Lookup { resource, source }),
        }

        if let Some(pre) = &info.precondition
            && pre.applies_to(direction)
        {
            let timeout = info.timeout.unwrap_or(self.options.resource_check_timeout);
            self.wait_for_precondition(pre, timeout).await?;
        }

        let Some(target) = info.target_replicas(direction) else {
            debug!(namespace = %self.namespace, %resource, %direction, "no replica target, nothing to do");
            return Ok(ScaleOutcome::NoTarget);
        };

        let current = self
            .read_with_retry(&resource, || self.client.get_replicas(&self.namespace, &resource))
            .await;
        let current = match current {
            Ok(current) => current,
            Err(ApiError::NotFound(_)) => return Err(ScaleError::NotFound { resource }),
            Err(source) => return Err(ScaleError::Lookup { resource, source }),
        };
        if !needs_scaling(direction, current, target) {
            debug!(namespace = %self.namespace, %resource, current, target, "already scaled");
            return Ok(ScaleOutcome::Unchanged { replicas: current });
        }

        self.patch_with_retry(info, target).await?;
        info!(
            namespace = %self.namespace,
            %resource,
            level = info.level,
            from = current,
            to = target,
            %direction,
            "resource scaled"
        );
        Ok(ScaleOutcome::Scaled {
            from: current,
            to: target,
        })
    }

    /// Poll the precondition resource until its condition holds.
    async fn wait_for_precondition(
        &self,
        pre: &Precondition,
        timeout: Duration,
    ) -> ScaleResult<()> {
        let started = Instant::now();
        // None when the timeout is too long to represent: wait indefinitely.
        let deadline = started.checked_add(timeout);

        loop {
            let satisfied = match self
                .client
                .get_resource_state(&self.namespace, &pre.resource)
                .await
            {
                Ok(state) => pre.condition.is_satisfied(Some(&state)),
                Err(ApiError::NotFound(_)) => pre.condition.is_satisfied(None),
                Err(e) => {
                    debug!(
                        namespace = %self.namespace,
                        resource = %pre.resource,
                        error = %e,
                        "precondition check failed, will retry"
                    );
                    false
                }
            };

            if satisfied {
                debug!(
                    namespace = %self.namespace,
                    resource = %pre.resource,
                    condition = %pre.condition,
                    waited = ?started.elapsed(),
                    "precondition satisfied"
                );
                return Ok(());
            }

            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                warn!(
                    namespace = %self.namespace,
                    resource = %pre.resource,
                    condition = %pre.condition,
                    ?timeout,
                    "precondition timed out"
                );
                return Err(ScaleError::PreconditionTimeout {
                    resource: pre.resource.clone(),
                    condition: pre.condition.clone(),
                    waited: timeout,
                });
            }

            let nap = match deadline {
                Some(d) => self.options.resource_check_interval.min(d - now),
                None => self.options.resource_check_interval,
            };
            tokio::time::sleep(nap).await;
        }
    }

    /// Run a read, retrying transient errors with the patch backoff.
    /// Not-found and auth errors are returned immediately.
    async fn read_with_retry<T, F, Fut>(
        &self,
        resource: &ResourceRef,
        mut read: F,
    ) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let max_attempts = self.options.scale_retry_attempts.max(1);
        let mut attempt = 1;

        loop {
            match read().await {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = self.options.retry_backoff(attempt);
                    warn!(
                        namespace = %self.namespace,
                        %resource,
                        attempt,
                        max_attempts,
                        ?backoff,
                        error = %e,
                        "resource read failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn patch_with_retry(&self, info: &DependentResourceInfo, target: u32) -> ScaleResult<()> {
        let resource = info.reference();
        let max_attempts = self.options.scale_retry_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self
                .client
                .set_replicas(&self.namespace, &resource, target)
                .await
            {
                Ok(()) => return Ok(()),
                Err(source) if !source.is_retryable() || attempt >= max_attempts => {
                    return Err(ScaleError::Patch {
                        resource,
                        replicas: target,
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    let backoff = self.options.retry_backoff(attempt);
                    warn!(
                        namespace = %self.namespace,
                        %resource,
                        attempt,
                        max_attempts,
                        ?backoff,
                        error = %e,
                        "scale patch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use watchdog_core::memory::InMemoryClient;
    use watchdog_core::{Condition, IGNORE_SCALING_ANNOTATION, ResourceState};

    const NS: &str = "shoot--dev--alpha";

    fn options() -> ScalerOptions {
        ScalerOptions::default()
            .with_resource_check_interval(Duration::from_millis(100))
            .with_resource_check_timeout(Duration::from_secs(2))
            .with_scale_resource_backoff(Duration::from_millis(10))
            .with_scale_retry_attempts(3)
    }

    async fn client_with(name: &str, replicas: u32) -> InMemoryClient {
        let client = InMemoryClient::new();
        client
            .insert(NS, ResourceRef::deployment(name), ResourceState::with_replicas(replicas))
            .await;
        client
    }

    fn scaler(client: &InMemoryClient) -> ResourceScaler {
        ResourceScaler::new(Arc::new(client.clone()), NS, options())
    }

    /// Fails the first reads with queued errors, then delegates.
    struct FlakyReads {
        inner: InMemoryClient,
        state_errors: Mutex<Vec<ApiError>>,
        replica_errors: Mutex<Vec<ApiError>>,
        reads: AtomicU32,
    }

    impl FlakyReads {
        fn new(inner: InMemoryClient) -> Self {
            Self {
                inner,
                state_errors: Mutex::new(Vec::new()),
                replica_errors: Mutex::new(Vec::new()),
                reads: AtomicU32::new(0),
            }
        }

        fn fail_state_reads(self, errors: Vec<ApiError>) -> Self {
            *self.state_errors.lock().unwrap() = errors;
            self
        }

        fn fail_replica_reads(self, errors: Vec<ApiError>) -> Self {
            *self.replica_errors.lock().unwrap() = errors;
            self
        }

        fn reads(&self) -> u32 {
            self.reads.load(Ordering::SeqCst)
        }

        fn next_error(queue: &Mutex<Vec<ApiError>>) -> Option<ApiError> {
            let mut queue = queue.lock().unwrap();
            (!queue.is_empty()).then(|| queue.remove(0))
        }
    }

    #[async_trait]
    impl ScaleClient for FlakyReads {
        async fn get_replicas(&self, namespace: &str, resource: &ResourceRef) -> ApiResult<u32> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = Self::next_error(&self.replica_errors) {
                return Err(e);
            }
            self.inner.get_replicas(namespace, resource).await
        }

        async fn set_replicas(
            &self,
            namespace: &str,
            resource: &ResourceRef,
            replicas: u32,
        ) -> ApiResult<()> {
            self.inner.set_replicas(namespace, resource, replicas).await
        }

        async fn get_resource_state(
            &self,
            namespace: &str,
            resource: &ResourceRef,
        ) -> ApiResult<ResourceState> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = Self::next_error(&self.state_errors) {
                return Err(e);
            }
            self.inner.get_resource_state(namespace, resource).await
        }
    }

    #[test]
    fn needs_scaling_is_directional() {
        assert!(needs_scaling(ScaleDirection::ScaleUp, 0, 1));
        assert!(!needs_scaling(ScaleDirection::ScaleUp, 3, 1));
        assert!(needs_scaling(ScaleDirection::ScaleDown, 2, 0));
        assert!(!needs_scaling(ScaleDirection::ScaleDown, 0, 0));
    }

    #[tokio::test]
    async fn scales_down_to_target() {
        let client = client_with("kcm", 2).await;
        let info = DependentResourceInfo::new("kcm", 0).scale_down_to(0);

        let outcome = scaler(&client)
            .scale(&info, ScaleDirection::ScaleDown)
            .await
            .unwrap();

        assert_eq!(outcome, ScaleOutcome::Scaled { from: 2, to: 0 });
        let state = client.state(NS, &ResourceRef::deployment("kcm")).await.unwrap();
        assert_eq!(state.replicas, 0);
    }

    #[tokio::test]
    async fn missing_target_is_noop() {
        let client = client_with("kcm", 2).await;
        let info = DependentResourceInfo::new("kcm", 0).scale_up_to(1);

        let outcome = scaler(&client)
            .scale(&info, ScaleDirection::ScaleDown)
            .await
            .unwrap();

        assert_eq!(outcome, ScaleOutcome::NoTarget);
        assert!(client.patches().await.is_empty());
    }

    #[tokio::test]
    async fn already_at_target_is_unchanged() {
        let client = client_with("kcm", 3).await;
        let info = DependentResourceInfo::new("kcm", 0).scale_up_to(1);

        let outcome = scaler(&client)
            .scale(&info, ScaleDirection::ScaleUp)
            .await
            .unwrap();

        assert_eq!(outcome, ScaleOutcome::Unchanged { replicas: 3 });
        assert!(client.patches().await.is_empty());
    }

    #[tokio::test]
    async fn optional_missing_resource_is_skipped() {
        let client = InMemoryClient::new();
        let info = DependentResourceInfo::new("cluster-autoscaler", 2)
            .scale_down_to(0)
            .optional();

        let outcome = scaler(&client)
            .scale(&info, ScaleDirection::ScaleDown)
            .await
            .unwrap();
        assert_eq!(outcome, ScaleOutcome::Skipped(SkipReason::NotFound));
    }

    #[tokio::test]
    async fn required_missing_resource_fails() {
        let client = InMemoryClient::new();
        let info = DependentResourceInfo::new("kcm", 0).scale_down_to(0);

        let err = scaler(&client)
            .scale(&info, ScaleDirection::ScaleDown)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ScaleError::NotFound {
                resource: ResourceRef::deployment("kcm")
            }
        );
    }

    #[tokio::test]
    async fn ignore_scaling_annotation_skips() {
        let client = InMemoryClient::new();
        let mut state = ResourceState::with_replicas(1);
        state
            .annotations
            .insert(IGNORE_SCALING_ANNOTATION.to_string(), "true".to_string());
        client.insert(NS, ResourceRef::deployment("kcm"), state).await;
        let info = DependentResourceInfo::new("kcm", 0).scale_down_to(0);

        let outcome = scaler(&client)
            .scale(&info, ScaleDirection::ScaleDown)
            .await
            .unwrap();
        assert_eq!(outcome, ScaleOutcome::Skipped(SkipReason::IgnoreAnnotation));
        assert!(client.patches().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_precondition_then_scales() {
        let client = InMemoryClient::new().with_manual_readiness();
        let kcm = ResourceRef::deployment("kcm");
        client.insert(NS, kcm.clone(), ResourceState::with_replicas(0)).await;
        client.insert(NS, ResourceRef::deployment("mcm"), ResourceState::with_replicas(0)).await;
        let info = DependentResourceInfo::new("mcm", 1)
            .scale_up_to(1)
            .with_precondition(Precondition {
                resource: kcm.clone(),
                condition: Condition::ReadyReplicasAtLeast { count: 1 },
                direction: None,
            });

        let task = {
            let scaler = scaler(&client);
            tokio::spawn(async move { scaler.scale(&info, ScaleDirection::ScaleUp).await })
        };

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(client.patches().await.is_empty());

        client.set_ready_replicas(NS, &kcm, 1).await;
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, ScaleOutcome::Scaled { from: 0, to: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_precondition_timeout_waits() {
        let client = InMemoryClient::new().with_manual_readiness();
        let kcm = ResourceRef::deployment("kcm");
        client.insert(NS, kcm.clone(), ResourceState::with_replicas(0)).await;
        client.insert(NS, ResourceRef::deployment("mcm"), ResourceState::with_replicas(0)).await;
        let mut info = DependentResourceInfo::new("mcm", 1)
            .scale_up_to(1)
            .with_precondition(Precondition {
                resource: kcm.clone(),
                condition: Condition::ReadyReplicasAtLeast { count: 1 },
                direction: None,
            });
        info.timeout = Some(Duration::MAX);

        let task = {
            let scaler = scaler(&client);
            tokio::spawn(async move { scaler.scale(&info, ScaleDirection::ScaleUp).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!task.is_finished());

        client.set_ready_replicas(NS, &kcm, 1).await;
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, ScaleOutcome::Scaled { from: 0, to: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn precondition_timeout_is_task_failure() {
        let client = client_with("mcm", 0).await;
        let mut info = DependentResourceInfo::new("mcm", 1)
            .scale_up_to(1)
            .with_precondition(Precondition {
                resource: ResourceRef::deployment("kcm"),
                condition: Condition::Exists,
                direction: Some(ScaleDirection::ScaleUp),
            });
        info.timeout = Some(Duration::from_millis(500));

        let err = scaler(&client)
            .scale(&info, ScaleDirection::ScaleUp)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ScaleError::PreconditionTimeout { waited, .. } if waited == Duration::from_millis(500)
        ));
        assert_eq!(err.class(), "precondition_timeout");
        assert!(client.patches().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn precondition_for_other_direction_is_ignored() {
        let client = client_with("mcm", 1).await;
        let info = DependentResourceInfo::new("mcm", 1)
            .scale_down_to(0)
            .with_precondition(Precondition {
                resource: ResourceRef::deployment("kcm"),
                condition: Condition::Exists,
                direction: Some(ScaleDirection::ScaleUp),
            });

        let outcome = scaler(&client)
            .scale(&info, ScaleDirection::ScaleDown)
            .await
            .unwrap();
        assert_eq!(outcome, ScaleOutcome::Scaled { from: 1, to: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn transient_patch_errors_are_retried() {
        let client = client_with("kcm", 0).await;
        let kcm = ResourceRef::deployment("kcm");
        client
            .fail_patches(
                NS,
                &kcm,
                vec![
                    ApiError::TooManyRequests("slow down".into()),
                    ApiError::Other("conflict".into()),
                ],
            )
            .await;
        let info = DependentResourceInfo::new("kcm", 0).scale_up_to(1);

        let outcome = scaler(&client)
            .scale(&info, ScaleDirection::ScaleUp)
            .await
            .unwrap();

        assert_eq!(outcome, ScaleOutcome::Scaled { from: 0, to: 1 });
        assert_eq!(client.patch_attempts(NS, &kcm).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let client = client_with("kcm", 0).await;
        let kcm = ResourceRef::deployment("kcm");
        client
            .fail_patches(NS, &kcm, vec![ApiError::Other("etcd timeout".into()); 5])
            .await;
        let info = DependentResourceInfo::new("kcm", 0).scale_up_to(1);

        let err = scaler(&client)
            .scale(&info, ScaleDirection::ScaleUp)
            .await
            .unwrap_err();

        assert!(matches!(err, ScaleError::Patch { attempts: 3, .. }));
        assert_eq!(client.patch_attempts(NS, &kcm).await, 3);
    }

    #[tokio::test]
    async fn terminal_patch_error_is_not_retried() {
        let client = client_with("kcm", 0).await;
        let kcm = ResourceRef::deployment("kcm");
        client
            .fail_patches(NS, &kcm, vec![ApiError::Forbidden("rbac".into())])
            .await;
        let info = DependentResourceInfo::new("kcm", 0).scale_up_to(1);

        let err = scaler(&client)
            .scale(&info, ScaleDirection::ScaleUp)
            .await
            .unwrap_err();

        assert!(matches!(err, ScaleError::Patch { attempts: 1, .. }));
        assert_eq!(err.class(), "forbidden");
        assert_eq!(client.patch_attempts(NS, &kcm).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_lookup_is_retried() {
        let inner = client_with("kcm", 2).await;
        let client = Arc::new(
            FlakyReads::new(inner.clone())
                .fail_state_reads(vec![ApiError::TooManyRequests("429".into())]),
        );
        let info = DependentResourceInfo::new("kcm", 0).scale_down_to(0);

        let outcome = ResourceScaler::new(client.clone(), NS, options())
            .scale(&info, ScaleDirection::ScaleDown)
            .await
            .unwrap();

        assert_eq!(outcome, ScaleOutcome::Scaled { from: 2, to: 0 });
        assert_eq!(inner.patches().await.len(), 1);
        // two state reads, one replica read
        assert_eq!(client.reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_replica_read_is_retried() {
        let inner = client_with("kcm", 0).await;
        let client = Arc::new(
            FlakyReads::new(inner.clone()).fail_replica_reads(vec![
                ApiError::Timeout("read timeout".into()),
                ApiError::TooManyRequests("429".into()),
            ]),
        );
        let info = DependentResourceInfo::new("kcm", 0).scale_up_to(1);

        let outcome = ResourceScaler::new(client.clone(), NS, options())
            .scale(&info, ScaleDirection::ScaleUp)
            .await
            .unwrap();

        assert_eq!(outcome, ScaleOutcome::Scaled { from: 0, to: 1 });
        assert_eq!(client.reads(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_retries_are_bounded() {
        let inner = client_with("kcm", 2).await;
        let client = Arc::new(
            FlakyReads::new(inner.clone())
                .fail_state_reads(vec![ApiError::Other("etcd timeout".into()); 5]),
        );
        let info = DependentResourceInfo::new("kcm", 0).scale_down_to(0);

        let err = ResourceScaler::new(client.clone(), NS, options())
            .scale(&info, ScaleDirection::ScaleDown)
            .await
            .unwrap_err();

        assert!(matches!(err, ScaleError::Lookup { .. }));
        assert_eq!(client.reads(), 3);
        assert!(inner.patches().await.is_empty());
    }

    #[tokio::test]
    async fn forbidden_lookup_is_not_retried() {
        let inner = client_with("kcm", 2).await;
        let client = Arc::new(
            FlakyReads::new(inner).fail_state_reads(vec![ApiError::Forbidden("rbac".into())]),
        );
        let info = DependentResourceInfo::new("kcm", 0).scale_down_to(0);

        let err = ResourceScaler::new(client.clone(), NS, options())
            .scale(&info, ScaleDirection::ScaleDown)
            .await
            .unwrap_err();

        assert_eq!(err.class(), "forbidden");
        assert_eq!(client.reads(), 1);
    }
}
