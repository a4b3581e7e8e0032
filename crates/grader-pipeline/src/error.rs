//! Error types for execution and orchestration.

use grader_core::StoreError;
use grader_sandbox::ContainerError;
use grader_sources::AcquisitionError;

/// Failures that prevent a pipeline run from producing a result.
///
/// Anything that goes wrong after the sandbox started is reported inside
/// [`PipelineResult`](crate::PipelineResult) instead, so the partial
/// transcript survives.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to start sandbox: {0}")]
    Start(#[source] ContainerError),
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("source acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("execution failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("job queue closed")]
    QueueClosed,

    #[error("invalid orchestrator configuration: {0}")]
    InvalidConfig(String),

    /// A job panicked; the worker survives it.
    #[error("internal error: {0}")]
    Internal(String),
}
