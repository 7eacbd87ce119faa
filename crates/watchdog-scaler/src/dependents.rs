//! Entry point the prober uses to scale a cluster's dependents.

use std::sync::Arc;

use async_trait::async_trait;

use watchdog_core::{DependentResourceInfo, ScaleClient, ScaleDirection};

use crate::flow::{FlowCreator, FlowReport};
use crate::options::ScalerOptions;

/// Scales every dependent of one monitored cluster in a given direction.
#[async_trait]
pub trait DependentScaler: Send + Sync {
    async fn scale(&self, direction: ScaleDirection) -> FlowReport;
}

/// [`DependentScaler`] that builds and runs a fresh flow per call.
pub struct FlowScaler {
    namespace: String,
    creator: FlowCreator,
}

impl FlowScaler {
    pub fn new(
        namespace: &str,
        client: Arc<dyn ScaleClient>,
        options: ScalerOptions,
        infos: Vec<DependentResourceInfo>,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            creator: FlowCreator::new(client, options, infos),
        }
    }
}

#[async_trait]
impl DependentScaler for FlowScaler {
    async fn scale(&self, direction: ScaleDirection) -> FlowReport {
        let name = format!("{direction}-{}", self.namespace);
        self.creator
            .create_flow(&name, &self.namespace, direction)
            .run()
            .await
    }
}
