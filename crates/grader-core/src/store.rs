//! Storage trait definitions for the grader.
//!
//! These traits define the persistence seams the execution engine depends on:
//! - `SubmissionStore`: submission records and their status transitions
//! - `AssignmentStore`: assignment execution context
//! - `RuleSource`: the ordered rule list of an assignment
//!
//! All traits are async and backend-agnostic. In-memory implementations live
//! in the [`memory`](crate::memory) module.

use async_trait::async_trait;

use crate::domain::{
    Assignment, AssignmentId, NewSubmission, Rule, Submission, SubmissionId, SubmissionOutcome,
    SubmissionStatus,
};
use crate::error::StoreError;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Submission persistence.
///
/// Guarantees:
/// - `create` validates the request and returns a `pending` submission.
/// - `set_status` only accepts legal non-terminal transitions.
/// - `complete` writes status, stdout and stderr exactly once; a second call
///   fails with `StoreError::AlreadyCompleted`.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn create(&self, new: NewSubmission) -> StoreResult<Submission>;

    async fn get(&self, id: SubmissionId) -> StoreResult<Submission>;

    async fn set_status(&self, id: SubmissionId, status: SubmissionStatus) -> StoreResult<()>;

    /// Rewrite the persisted upload reference after relocation.
    async fn set_source_ref(&self, id: SubmissionId, source_ref: String) -> StoreResult<()>;

    async fn complete(
        &self,
        id: SubmissionId,
        outcome: SubmissionOutcome,
    ) -> StoreResult<Submission>;
}

/// Assignment lookup.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn assignment(&self, id: AssignmentId) -> StoreResult<Assignment>;
}

/// Ordered rules of an assignment, ascending by `order`.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn rules_for(&self, assignment_id: AssignmentId) -> StoreResult<Vec<Rule>>;
}
