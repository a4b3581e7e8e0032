//! Grader Core Library
//!
//! Domain model and shared infrastructure for the submission grader:
//! - Rules, submissions, assignments and environments
//! - The rule ordering service (dense 1-based ordering per assignment)
//! - The on-disk storage layout for staged sources and course attachments
//! - Store traits plus in-memory implementations
//! - Configuration, tracing initialisation and lifecycle observability

pub mod config;
pub mod domain;
pub mod error;
pub mod layout;
pub mod memory;
pub mod obs;
pub mod ordering;
pub mod store;
pub mod telemetry;

pub use config::GraderConfig;
pub use domain::{
    Assignment, AssignmentId, CourseId, Environment, EnvironmentStatus, NewRule, NewSubmission,
    ProcessingPhase, Rule, RuleId, SourceStrategyKind, Submission, SubmissionId,
    SubmissionOutcome, SubmissionStatus, UserId,
};
pub use error::{DomainError, OrderingError, Result, StoreError};
pub use layout::StorageLayout;
pub use memory::{MemoryAssignmentStore, MemorySubmissionStore};
pub use ordering::RuleBook;
pub use store::{AssignmentStore, RuleSource, StoreResult, SubmissionStore};
pub use telemetry::init_tracing;

/// Grader version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
