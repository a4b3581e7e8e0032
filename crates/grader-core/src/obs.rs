//! Structured observability hooks for the submission lifecycle.
//!
//! - A submission-scoped tracing span for instrumenting async work
//! - Emission functions for key lifecycle events: queued, phase change,
//!   container start/cleanup, rule finished, submission finished

use tracing::info;

use crate::domain::{SubmissionId, SubmissionStatus};

/// Span scoping everything done for one submission. Attach it to async work
/// with `tracing::Instrument`.
pub fn submission_span(submission_id: SubmissionId) -> tracing::Span {
    tracing::info_span!("grader.submission", submission_id = %submission_id)
}

pub fn emit_submission_queued(submission_id: SubmissionId, strategy: &str) {
    info!(event = "submission.queued", submission_id = %submission_id, strategy = %strategy);
}

pub fn emit_submission_phase(submission_id: SubmissionId, status: SubmissionStatus) {
    info!(event = "submission.phase", submission_id = %submission_id, status = %status);
}

pub fn emit_submission_finished(submission_id: SubmissionId, status: SubmissionStatus, duration_ms: u64) {
    info!(
        event = "submission.finished",
        submission_id = %submission_id,
        status = %status,
        duration_ms = duration_ms,
    );
}

pub fn emit_container_started(container: &str, image: &str) {
    info!(event = "container.started", container = %container, image = %image);
}

pub fn emit_container_cleaned_up(container: &str, stop_code: i32, remove_code: i32) {
    info!(
        event = "container.cleaned_up",
        container = %container,
        stop_code = stop_code,
        remove_code = remove_code,
    );
}

pub fn emit_rule_finished(rule: &str, order: u32, exit_code: i32, duration_ms: u64) {
    info!(
        event = "rule.finished",
        rule = %rule,
        order = order,
        exit_code = exit_code,
        duration_ms = duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_span_name() {
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let span = submission_span(SubmissionId(1));
            assert_eq!(span.metadata().map(|m| m.name()), Some("grader.submission"));
        });
    }
}
