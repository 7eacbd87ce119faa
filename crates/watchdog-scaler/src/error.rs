//! Scaler error types.

use std::time::Duration;

use thiserror::Error;
use watchdog_core::{ApiError, Condition, ResourceRef};

/// Terminal failure of one resource scale task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScaleError {
    #[error("{resource} not found")]
    NotFound { resource: ResourceRef },

    #[error("failed to read {resource}: {source}")]
    Lookup {
        resource: ResourceRef,
        source: ApiError,
    },

    #[error("timed out after {waited:?} waiting for {resource} to satisfy {condition}")]
    PreconditionTimeout {
        resource: ResourceRef,
        condition: Condition,
        waited: Duration,
    },

    #[error("failed to scale {resource} to {replicas} after {attempts} attempt(s): {source}")]
    Patch {
        resource: ResourceRef,
        replicas: u32,
        attempts: u32,
        source: ApiError,
    },

    #[error("scale task for {0} aborted")]
    Aborted(String),
}

impl ScaleError {
    /// Short error-class label for log fields.
    pub fn class(&self) -> &'static str {
        match self {
            ScaleError::NotFound { .. } => "not_found",
            ScaleError::Lookup { source, .. } | ScaleError::Patch { source, .. } => source.class(),
            ScaleError::PreconditionTimeout { .. } => "precondition_timeout",
            ScaleError::Aborted(_) => "aborted",
        }
    }
}

pub type ScaleResult<T> = Result<T, ScaleError>;

/// A task id that does not follow the `direction:level-N:names` layout.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed task id {0:?}")]
pub struct TaskIdError(pub String);
