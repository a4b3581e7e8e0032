//! Submissions and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AssignmentId, SubmissionId, UserId};
use crate::error::{DomainError, Result};

/// How a submission's sources reach the store directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStrategyKind {
    /// A file uploaded with the submission, parked in a temporary location.
    Uploaded,
    /// A remote repository fetched as a tarball.
    Repository,
}

impl SourceStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStrategyKind::Uploaded => "uploaded",
            SourceStrategyKind::Repository => "repository",
        }
    }
}

impl std::fmt::Display for SourceStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-state of [`SubmissionStatus::Processing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPhase {
    Acquiring,
    Executing,
}

/// Submission lifecycle:
/// `pending -> processing(acquiring) -> processing(executing) -> performed | failed`.
///
/// Any non-terminal state may also jump straight to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Processing(ProcessingPhase),
    Performed,
    Failed,
}

impl SubmissionStatus {
    /// Persisted status name, without the processing phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Processing(_) => "processing",
            SubmissionStatus::Performed => "performed",
            SubmissionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Performed | SubmissionStatus::Failed)
    }

    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        use ProcessingPhase::*;
        use SubmissionStatus::*;

        match (self, next) {
            (Pending, Processing(Acquiring)) => true,
            (Processing(Acquiring), Processing(Executing)) => true,
            (Processing(Executing), Performed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Validate and return the next status.
    pub fn transition(self, next: SubmissionStatus) -> Result<SubmissionStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionStatus::Processing(ProcessingPhase::Acquiring) => {
                write!(f, "processing(acquiring)")
            }
            SubmissionStatus::Processing(ProcessingPhase::Executing) => {
                write!(f, "processing(executing)")
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// One graded attempt tied to an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub assignment_id: AssignmentId,
    pub user_id: UserId,
    pub strategy: SourceStrategyKind,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    /// Path of the uploaded file relative to the media root.
    #[serde(default)]
    pub uploaded_source_ref: Option<String>,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub created_at: DateTime<Utc>,
}

/// Submission request before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub assignment_id: AssignmentId,
    pub user_id: UserId,
    pub strategy: SourceStrategyKind,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub uploaded_source_ref: Option<String>,
}

impl NewSubmission {
    /// Submission whose sources were uploaded to `source_ref` (relative to the media root).
    pub fn uploaded(assignment_id: AssignmentId, user_id: UserId, source_ref: &str) -> Self {
        Self {
            assignment_id,
            user_id,
            strategy: SourceStrategyKind::Uploaded,
            repo_url: None,
            branch: None,
            uploaded_source_ref: Some(source_ref.to_string()),
        }
    }

    /// Submission fetched from `repo_url` at `branch`.
    pub fn repository(
        assignment_id: AssignmentId,
        user_id: UserId,
        repo_url: &str,
        branch: &str,
    ) -> Self {
        Self {
            assignment_id,
            user_id,
            strategy: SourceStrategyKind::Repository,
            repo_url: Some(repo_url.to_string()),
            branch: Some(branch.to_string()),
            uploaded_source_ref: None,
        }
    }

    /// Check that the fields required by the declared strategy are present.
    pub fn validate(&self) -> Result<()> {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
        }

        match self.strategy {
            SourceStrategyKind::Uploaded if !present(&self.uploaded_source_ref) => Err(
                DomainError::InvalidSubmission("uploaded strategy requires a source file".into()),
            ),
            SourceStrategyKind::Repository
                if !present(&self.repo_url) || !present(&self.branch) =>
            {
                Err(DomainError::InvalidSubmission(
                    "repository strategy requires repo_url and branch".into(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Materialize into a pending [`Submission`].
    pub fn into_submission(self, id: SubmissionId) -> Submission {
        Submission {
            id,
            assignment_id: self.assignment_id,
            user_id: self.user_id,
            strategy: self.strategy,
            repo_url: self.repo_url,
            branch: self.branch,
            uploaded_source_ref: self.uploaded_source_ref,
            status: SubmissionStatus::Pending,
            stdout: String::new(),
            stderr: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// Terminal result written onto a submission exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub status: SubmissionStatus,
    pub stdout: String,
    pub stderr: String,
}

impl SubmissionOutcome {
    pub fn performed(stdout: String) -> Self {
        Self {
            status: SubmissionStatus::Performed,
            stdout,
            stderr: String::new(),
        }
    }

    pub fn failed(stdout: String, stderr: String) -> Self {
        Self {
            status: SubmissionStatus::Failed,
            stdout,
            stderr,
        }
    }
}
