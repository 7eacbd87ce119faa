//! `dwd watch` — probe a live control plane and simulate the flows.
//!
//! Probing is real (HTTP against the given addresses); scaling runs against
//! an in-memory copy of the dependents, so verdict changes and the patches
//! they would cause show up in the log without touching a cluster.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use watchdog_controller::{ClusterInfo, ClusterReconciler, ReconcileAction};
use watchdog_core::memory::InMemoryClient;
use watchdog_core::{Endpoint, ProbeEndpoints, ResourceState, ScaleDirection, WatchdogConfig};
use watchdog_prober::{HttpProbeClient, ProberManager};

pub async fn watch(
    config_path: &Path,
    namespace: &str,
    internal: &str,
    external: &str,
) -> anyhow::Result<()> {
    let config = WatchdogConfig::from_file(config_path)?;
    let resources = simulated_dependents(&config, namespace).await;
    let probe_client = HttpProbeClient::new(config.probe.timeout);
    let manager = Arc::new(ProberManager::new().with_max_probers(config.probe.max_monitors));

    let reconciler = ClusterReconciler::new(
        Arc::clone(&manager),
        Arc::new(config),
        Arc::new(resources.clone()),
        Arc::new(probe_client),
    );

    let cluster = ClusterInfo::running(
        namespace,
        ProbeEndpoints {
            internal: Endpoint::new(internal),
            external: Endpoint::new(external),
        },
    );
    let action = reconciler.reconcile(namespace, Some(&cluster)).await;
    if action != ReconcileAction::Started {
        anyhow::bail!("prober for {namespace} not started: {action:?}");
    }
    info!(%namespace, %internal, %external, "watching control plane, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    manager.stop_all().await;

    let patches = resources.patches().await;
    info!(patches = patches.len(), "simulated patches applied");
    for p in patches {
        println!("{} {} → {}", p.namespace, p.resource, p.replicas);
    }
    Ok(())
}

/// In-memory dependents at their scale-up targets, plus any resource a
/// precondition refers to.
async fn simulated_dependents(config: &WatchdogConfig, namespace: &str) -> InMemoryClient {
    let client = InMemoryClient::new();
    for info in &config.dependent_resources {
        let replicas = info.target_replicas(ScaleDirection::ScaleUp).unwrap_or(1);
        client
            .insert(namespace, info.reference(), ResourceState::with_replicas(replicas))
            .await;
    }
    for pre in config.dependent_resources.iter().filter_map(|d| d.precondition.as_ref()) {
        if client.state(namespace, &pre.resource).await.is_none() {
            client
                .insert(namespace, pre.resource.clone(), ResourceState::with_replicas(1))
                .await;
        }
    }
    client
}
