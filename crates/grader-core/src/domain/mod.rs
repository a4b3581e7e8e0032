//! Domain models for the grader.
//!
//! Canonical definitions for the core entities:
//! - `Rule`: One ordered build/test step of an assignment
//! - `Submission`: One graded attempt and its lifecycle status
//! - `Assignment` / `Environment`: Execution context (course + container image)

pub mod assignment;
pub mod ids;
pub mod rule;
pub mod submission;

pub use assignment::{Assignment, Environment, EnvironmentStatus};
pub use ids::{AssignmentId, CourseId, RuleId, SubmissionId, UserId};
pub use rule::{NewRule, Rule};
pub use submission::{
    NewSubmission, ProcessingPhase, SourceStrategyKind, Submission, SubmissionOutcome,
    SubmissionStatus,
};
