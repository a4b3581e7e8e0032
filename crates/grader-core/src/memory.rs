//! In-memory store implementations.
//!
//! Back the CLI's batch mode and the test suites. Both stores are safe to
//! share across worker tasks behind an `Arc`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{
    Assignment, AssignmentId, NewSubmission, Submission, SubmissionId, SubmissionOutcome,
    SubmissionStatus,
};
use crate::error::{DomainError, StoreError};
use crate::store::{AssignmentStore, StoreResult, SubmissionStore};

// ---------------------------------------------------------------------------
// MemorySubmissionStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Submissions {
    next_id: u64,
    records: HashMap<SubmissionId, Submission>,
}

/// In-memory submission store backed by a `HashMap<SubmissionId, Submission>`.
#[derive(Debug, Default)]
pub struct MemorySubmissionStore {
    inner: Mutex<Submissions>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every submission, ordered by id.
    pub fn all(&self) -> Vec<Submission> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Submission> = inner.records.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        all
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn create(&self, new: NewSubmission) -> StoreResult<Submission> {
        new.validate()?;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let submission = new.into_submission(SubmissionId(inner.next_id));
        inner.records.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn get(&self, id: SubmissionId) -> StoreResult<Submission> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .records
            .get(&id)
            .cloned()
            .ok_or(StoreError::SubmissionNotFound(id))
    }

    async fn set_status(&self, id: SubmissionId, status: SubmissionStatus) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(StoreError::SubmissionNotFound(id))?;
        if record.status.is_terminal() {
            return Err(StoreError::AlreadyCompleted(id));
        }
        if status.is_terminal() {
            // Terminal states carry output and go through `complete`.
            return Err(DomainError::InvalidTransition {
                from: record.status,
                to: status,
            }
            .into());
        }
        record.status = record.status.transition(status)?;
        Ok(())
    }

    async fn set_source_ref(&self, id: SubmissionId, source_ref: String) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(StoreError::SubmissionNotFound(id))?;
        record.uploaded_source_ref = Some(source_ref);
        Ok(())
    }

    async fn complete(
        &self,
        id: SubmissionId,
        outcome: SubmissionOutcome,
    ) -> StoreResult<Submission> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(StoreError::SubmissionNotFound(id))?;
        if record.status.is_terminal() {
            return Err(StoreError::AlreadyCompleted(id));
        }
        record.status = record.status.transition(outcome.status)?;
        record.stdout = outcome.stdout;
        record.stderr = outcome.stderr;
        Ok(record.clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryAssignmentStore
// ---------------------------------------------------------------------------

/// In-memory assignment store.
#[derive(Debug, Default)]
pub struct MemoryAssignmentStore {
    assignments: Mutex<HashMap<AssignmentId, Assignment>>,
}

impl MemoryAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, assignment: Assignment) {
        let mut assignments = self.assignments.lock().unwrap_or_else(|e| e.into_inner());
        assignments.insert(assignment.id, assignment);
    }
}

#[async_trait]
impl AssignmentStore for MemoryAssignmentStore {
    async fn assignment(&self, id: AssignmentId) -> StoreResult<Assignment> {
        let assignments = self.assignments.lock().unwrap_or_else(|e| e.into_inner());
        assignments
            .get(&id)
            .cloned()
            .ok_or(StoreError::AssignmentNotFound(id))
    }
}
