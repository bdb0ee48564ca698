//! The orchestrator's closed error type. Every collaborator error is wrapped with the step name
//! that produced it; callers dispatch on [`ErrorKind`] rather than matching concrete variants, so
//! the driver loop's retry/terminal logic stays in one place.

use models::drain::DrainError;
use models::scaler::error::ScalerError;
use models::silence::SilenceError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum OrchestratorError {
    #[snafu(display("step '{}' failed calling the cluster API: '{}'", step, source))]
    Kube { step: &'static str, source: kube::Error },

    #[snafu(display("step '{}' failed scaling: '{}'", step, source))]
    Scale {
        step: &'static str,
        source: ScalerError,
    },

    #[snafu(display("step '{}' failed draining node '{}': '{}'", step, node, source))]
    Drain {
        step: &'static str,
        node: String,
        source: DrainError,
    },

    #[snafu(display("step '{}' failed contacting the silence client: '{}'", step, source))]
    Silence {
        step: &'static str,
        source: SilenceError,
    },

    #[snafu(display(
        "step '{}': desired version '{}' is not offered by the platform",
        step,
        version
    ))]
    Validation { step: &'static str, version: String },

    #[snafu(display("step '{}': required resource not found", step))]
    ResourceNotFound { step: &'static str },
}

/// The structural kind a driver loop reasons about, independent of which collaborator raised it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Transient,
    NotFound,
    Validation,
    ScaleTimeout,
    DrainFailed,
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Kube { source, .. } => {
                if matches!(source, kube::Error::Api(e) if e.code == 404) {
                    ErrorKind::NotFound
                } else {
                    ErrorKind::Transient
                }
            }
            OrchestratorError::Scale { source, .. } => match source {
                ScalerError::ScaleTimeout { .. } => ErrorKind::ScaleTimeout,
                ScalerError::NoOriginalMachineSet => ErrorKind::Validation,
                _ => ErrorKind::Transient,
            },
            OrchestratorError::Drain { .. } => ErrorKind::DrainFailed,
            OrchestratorError::Silence { .. } => ErrorKind::Transient,
            OrchestratorError::Validation { .. } => ErrorKind::Validation,
            OrchestratorError::ResourceNotFound { .. } => ErrorKind::NotFound,
        }
    }

    pub fn step_name(&self) -> &'static str {
        match self {
            OrchestratorError::Kube { step, .. }
            | OrchestratorError::Scale { step, .. }
            | OrchestratorError::Drain { step, .. }
            | OrchestratorError::Silence { step, .. }
            | OrchestratorError::Validation { step, .. }
            | OrchestratorError::ResourceNotFound { step } => step,
        }
    }
}
