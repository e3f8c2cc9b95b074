//! Error types for the accuracy harness.
//!
//! Skips and validation failures are expected outcomes of a single test
//! invocation and are reported through [`Outcome`](crate::harness::Outcome).
//! Everything here is a hard failure that aborts the current invocation.

use thiserror::Error;

use crate::device::{DeviceStatus, EngineStatus};
use crate::problem::ProblemContext;

/// Result type alias using the harness [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Hard failures of one accuracy-test invocation.
#[derive(Error, Debug)]
pub enum Error {
    /// The problem description violates its own invariants.
    #[error("Invalid problem description: {reason}")]
    InvalidProblem {
        /// What is wrong with the description
        reason: String,
    },

    /// A device allocation or transfer failed after the budget checks passed.
    #[error("{op} failed: {status}{context}")]
    Resource {
        /// The operation that failed, e.g. "device allocation for input buffer 1"
        op: String,
        /// Status reported by the device memory collaborator
        status: DeviceStatus,
        /// Device-facing parameters of the failing configuration
        context: Box<ProblemContext>,
    },

    /// The FFT engine rejected a description, plan or execution.
    #[error("{op} failed: {status}{context}")]
    Engine {
        /// The engine call that failed, e.g. "plan creation"
        op: &'static str,
        /// Status reported by the engine
        status: EngineStatus,
        /// Device-facing parameters of the failing configuration
        context: Box<ProblemContext>,
    },
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidProblem {
            reason: reason.into(),
        }
    }

    pub(crate) fn resource(
        op: impl Into<String>,
        status: DeviceStatus,
        context: &ProblemContext,
    ) -> Self {
        Error::Resource {
            op: op.into(),
            status,
            context: Box::new(context.clone()),
        }
    }

    pub(crate) fn engine(op: &'static str, status: EngineStatus, context: &ProblemContext) -> Self {
        Error::Engine {
            op,
            status,
            context: Box::new(context.clone()),
        }
    }
}
