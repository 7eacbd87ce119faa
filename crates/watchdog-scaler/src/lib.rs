//! watchdog-scaler — dependency-ordered scaling of a cluster's dependents.
//!
//! Turns the configured [`DependentResourceInfo`](watchdog_core::DependentResourceInfo)
//! list into a level-ordered [`Flow`] and runs it: levels one after another,
//! resources within a level concurrently.
//!
//! # Architecture
//!
//! ```text
//! FlowScaler (DependentScaler)
//!   └── FlowCreator::create_flow(name, namespace, direction)
//!       └── Flow
//!           ├── FlowStep per level (TaskId, dependent TaskIds)
//!           └── ResourceScaler per task
//!               ├── precondition wait (interval / timeout)
//!               └── scale patch with doubling backoff
//! ```
//!
//! Scale-up walks levels ascending, scale-down descending. What happens after
//! a step with a failed task is governed by
//! [`StepFailurePolicy`](watchdog_core::StepFailurePolicy).

pub mod dependents;
pub mod error;
pub mod flow;
pub mod options;
pub mod scaler;
pub mod task;

pub use dependents::{DependentScaler, FlowScaler};
pub use error::{ScaleError, ScaleResult, TaskIdError};
pub use flow::{Flow, FlowCreator, FlowReport, FlowStep, StepOutcome, StepReport, TaskReport};
pub use options::ScalerOptions;
pub use scaler::{ResourceScaler, ScaleOutcome, SkipReason};
pub use task::TaskId;
