//! Scaling flows — level-ordered execution plans over dependent resources.
//!
//! Resources are grouped by level. Scale-up walks levels ascending, scale-down
//! descending. Each level becomes one [`FlowStep`] whose tasks run
//! concurrently; a step depends on exactly the step before it.
//!
//! ```text
//! scale-down, levels {0: [kcm], 1: [mcm, ca]}
//!
//!   scale-down:level-1:mcm,ca ──► scale-down:level-0:kcm
//!      ├── mcm ┐ concurrent
//!      └── ca  ┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use watchdog_core::{DependentResourceInfo, ScaleClient, ScaleDirection, StepFailurePolicy};

use crate::error::{ScaleError, ScaleResult};
use crate::options::ScalerOptions;
use crate::scaler::{ResourceScaler, ScaleOutcome};
use crate::task::TaskId;

/// One level of a flow.
#[derive(Debug, Clone, Serialize)]
pub struct FlowStep {
    pub task_id: TaskId,
    pub level: u32,
    /// Resources scaled concurrently in this step.
    pub resources: Vec<DependentResourceInfo>,
    /// Steps that must finish before this one starts.
    pub dependent_task_ids: Vec<TaskId>,
}

impl FlowStep {
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Builds flows from the configured dependent resources.
pub struct FlowCreator {
    client: Arc<dyn ScaleClient>,
    options: ScalerOptions,
    infos: Vec<DependentResourceInfo>,
}

impl FlowCreator {
    pub fn new(
        client: Arc<dyn ScaleClient>,
        options: ScalerOptions,
        infos: Vec<DependentResourceInfo>,
    ) -> Self {
        Self {
            client,
            options,
            infos,
        }
    }

    /// Build the flow for `direction` over resources in `namespace`.
    pub fn create_flow(&self, name: &str, namespace: &str, direction: ScaleDirection) -> Flow {
        // BTreeMap keeps levels sorted; insertion order within a level is kept.
        let mut by_level: BTreeMap<u32, Vec<DependentResourceInfo>> = BTreeMap::new();
        for info in &self.infos {
            by_level.entry(info.level).or_default().push(info.clone());
        }

        let mut levels: Vec<(u32, Vec<DependentResourceInfo>)> = by_level.into_iter().collect();
        if direction == ScaleDirection::ScaleDown {
            levels.reverse();
        }

        let mut steps: Vec<FlowStep> = Vec::with_capacity(levels.len());
        for (level, resources) in levels {
            let names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
            let task_id = TaskId::new(direction, level, &names);
            let dependent_task_ids = steps
                .last()
                .map(|prev| vec![prev.task_id.clone()])
                .unwrap_or_default();
            steps.push(FlowStep {
                task_id,
                level,
                resources,
                dependent_task_ids,
            });
        }

        debug!(flow = %name, %namespace, %direction, steps = steps.len(), "flow created");

        Flow {
            name: name.to_string(),
            direction,
            steps,
            policy: self.options.step_failure_policy,
            scaler: Arc::new(ResourceScaler::new(
                self.client.clone(),
                namespace,
                self.options.clone(),
            )),
        }
    }
}

/// Result of one resource task within a step.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub resource: String,
    pub result: ScaleResult<ScaleOutcome>,
}

#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Every task ran; individual results may be failures.
    Completed(Vec<TaskReport>),
    /// Not run because a step it depends on failed.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub task_id: TaskId,
    pub level: u32,
    pub outcome: StepOutcome,
}

impl StepReport {
    pub fn succeeded(&self) -> bool {
        match &self.outcome {
            StepOutcome::Completed(tasks) => tasks.iter().all(|t| t.result.is_ok()),
            StepOutcome::Skipped => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowReport {
    pub flow: String,
    pub direction: ScaleDirection,
    pub steps: Vec<StepReport>,
}

impl FlowReport {
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(StepReport::succeeded)
    }

    /// Resources whose task ended in an error.
    pub fn failed_resources(&self) -> Vec<(&str, &ScaleError)> {
        self.steps
            .iter()
            .filter_map(|s| match &s.outcome {
                StepOutcome::Completed(tasks) => Some(tasks),
                StepOutcome::Skipped => None,
            })
            .flatten()
            .filter_map(|t| t.result.as_ref().err().map(|e| (t.resource.as_str(), e)))
            .collect()
    }

    pub fn skipped_steps(&self) -> Vec<&TaskId> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Skipped))
            .map(|s| &s.task_id)
            .collect()
    }
}

/// An executable scaling plan for one namespace and direction.
pub struct Flow {
    name: String,
    direction: ScaleDirection,
    steps: Vec<FlowStep>,
    policy: StepFailurePolicy,
    scaler: Arc<ResourceScaler>,
}

impl Flow {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> ScaleDirection {
        self.direction
    }

    pub fn namespace(&self) -> &str {
        self.scaler.namespace()
    }

    pub fn steps(&self) -> &[FlowStep] {
        &self.steps
    }

    /// Execute all steps in order.
    ///
    /// A step starts only after every step it depends on has finished. Task
    /// failures never abort sibling tasks; whether later steps still run is
    /// decided by the step failure policy.
    pub async fn run(&self) -> FlowReport {
        let namespace = self.namespace();
        info!(
            flow = %self.name,
            %namespace,
            direction = %self.direction,
            steps = self.steps.len(),
            "starting scaling flow"
        );

        // task id → whether the step succeeded
        let mut finished: HashMap<TaskId, bool> = HashMap::new();
        let mut reports = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let blocked = step
                .dependent_task_ids
                .iter()
                .any(|dep| !finished.get(dep).copied().unwrap_or(false));

            if blocked && self.policy == StepFailurePolicy::Abort {
                warn!(
                    flow = %self.name,
                    %namespace,
                    task_id = %step.task_id,
                    level = step.level,
                    "skipping step, a dependency did not succeed"
                );
                finished.insert(step.task_id.clone(), false);
                reports.push(StepReport {
                    task_id: step.task_id.clone(),
                    level: step.level,
                    outcome: StepOutcome::Skipped,
                });
                continue;
            }

            let tasks = self.run_step(step).await;
            let report = StepReport {
                task_id: step.task_id.clone(),
                level: step.level,
                outcome: StepOutcome::Completed(tasks),
            };
            finished.insert(step.task_id.clone(), report.succeeded());
            reports.push(report);
        }

        let report = FlowReport {
            flow: self.name.clone(),
            direction: self.direction,
            steps: reports,
        };
        if report.is_success() {
            info!(flow = %self.name, %namespace, direction = %self.direction, "scaling flow completed");
        } else {
            warn!(
                flow = %self.name,
                %namespace,
                direction = %self.direction,
                failed = report.failed_resources().len(),
                skipped_steps = report.skipped_steps().len(),
                "scaling flow finished with failures"
            );
        }
        report
    }

    async fn run_step(&self, step: &FlowStep) -> Vec<TaskReport> {
        debug!(
            flow = %self.name,
            task_id = %step.task_id,
            level = step.level,
            tasks = step.resources.len(),
            "running step"
        );

        let mut set = JoinSet::new();
        for (index, info) in step.resources.iter().cloned().enumerate() {
            let scaler = self.scaler.clone();
            let direction = self.direction;
            set.spawn(async move {
                let result = scaler.scale(&info, direction).await;
                (index, info.name, result)
            });
        }

        let mut slots: Vec<Option<TaskReport>> = vec![None; step.resources.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, resource, result)) => {
                    if let Err(e) = &result {
                        error!(
                            flow = %self.name,
                            namespace = %self.namespace(),
                            level = step.level,
                            %resource,
                            class = e.class(),
                            error = %e,
                            "scale task failed"
                        );
                    }
                    slots[index] = Some(TaskReport { resource, result });
                }
                Err(e) => error!(flow = %self.name, task_id = %step.task_id, error = %e, "scale task panicked"),
            }
        }

        // A panicked task leaves its slot empty.
        slots
            .into_iter()
            .zip(&step.resources)
            .map(|(slot, info)| {
                slot.unwrap_or_else(|| TaskReport {
                    resource: info.name.clone(),
                    result: Err(ScaleError::Aborted(info.name.clone())),
                })
            })
            .collect()
    }
}
