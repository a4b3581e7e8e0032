//! Rule execution and submission orchestration.
//!
//! - [`rule`]: how a rule becomes an argv inside the container
//! - [`pipeline`]: run an assignment's rules against staged sources in one
//!   sandbox session
//! - [`queue`]: typed jobs and the shared work queue
//! - [`orchestrator`]: the worker pool driving submissions from `pending`
//!   through acquisition and execution to a terminal status

pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod queue;
pub mod rule;

pub use error::{OrchestratorError, PipelineError};
pub use orchestrator::{GradingContext, Orchestrator};
pub use pipeline::{PipelineResult, PipelineSettings, RuleOutcome, RulePipeline, RunRequest};
pub use queue::{Job, JobHandle, JobQueue};
