//! Error taxonomy for the grader domain.

use crate::domain::{AssignmentId, RuleId, SubmissionId, SubmissionStatus};

/// Errors produced while validating domain values.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    #[error("invalid attachment name: {0:?}")]
    InvalidAttachmentName(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced by submission and assignment stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("submission not found: {0}")]
    SubmissionNotFound(SubmissionId),

    #[error("assignment not found: {0}")]
    AssignmentNotFound(AssignmentId),

    #[error("submission {0} already reached a terminal status")]
    AlreadyCompleted(SubmissionId),

    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Errors produced by the rule ordering service.
#[derive(Debug, thiserror::Error)]
pub enum OrderingError {
    #[error("rule not found: {0}")]
    RuleNotFound(RuleId),

    #[error("order {order} out of range 1..={max}")]
    OrderOutOfRange { order: u32, max: u32 },

    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
