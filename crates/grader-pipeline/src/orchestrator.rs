//! Submission orchestrator: a fixed pool of workers consuming typed jobs.
//!
//! ```text
//! submit ─> pending ──AcquireSources──> processing(acquiring)
//!                                         │ ok: ExecuteSubmission
//!                                         v
//!                                processing(executing) ──> performed | failed
//! ```
//!
//! Execution is only ever enqueued by a successful acquisition, so it
//! strictly follows it. Any error along the way ends the submission as
//! `failed` with the error in `stderr`. A panicking job fails its own
//! submission and nothing else; the worker keeps serving the queue.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use grader_core::obs;
use grader_core::{
    AssignmentStore, DomainError, NewSubmission, ProcessingPhase, RuleSource, StorageLayout, StoreError,
    Submission, SubmissionId, SubmissionOutcome, SubmissionStatus, SubmissionStore,
};
use grader_sources::SourceAcquirer;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::error::OrchestratorError;
use crate::pipeline::{RulePipeline, RunRequest};
use crate::queue::{Job, JobHandle, JobQueue, SharedReceiver};

/// Everything a worker needs to move a submission forward.
pub struct GradingContext {
    pub submissions: Arc<dyn SubmissionStore>,
    pub assignments: Arc<dyn AssignmentStore>,
    pub rules: Arc<dyn RuleSource>,
    pub acquirer: Arc<dyn SourceAcquirer>,
    pub pipeline: Arc<RulePipeline>,
    pub layout: StorageLayout,
}

pub struct Orchestrator {
    context: Arc<GradingContext>,
    queue: JobQueue,
    workers: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Spawn `workers` workers on the current tokio runtime.
    pub fn start(context: GradingContext, workers: usize) -> Result<Self, OrchestratorError> {
        if workers == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "at least one worker is required".into(),
            ));
        }

        let context = Arc::new(context);
        let queue = JobQueue::new();
        let handle = queue.handle().ok_or(OrchestratorError::QueueClosed)?;

        info!(workers, "Orchestrator starting");
        let workers = (0..workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&context),
                    queue.receiver(),
                    handle.clone(),
                ))
            })
            .collect();

        Ok(Self {
            context,
            queue,
            workers,
        })
    }

    pub fn context(&self) -> &GradingContext {
        &self.context
    }

    /// Record a new submission and schedule its acquisition. Returns as soon
    /// as the job is queued.
    pub async fn submit(&self, new: NewSubmission) -> Result<Submission, OrchestratorError> {
        let submission = self.context.submissions.create(new).await?;
        self.queue.push(Job::AcquireSources {
            submission_id: submission.id,
        })?;
        obs::emit_submission_queued(submission.id, submission.strategy.as_str());
        Ok(submission)
    }

    pub fn enqueue(&self, job: Job) -> Result<(), OrchestratorError> {
        self.queue.push(job)
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Resolve once every queued job, including follow-ups, has finished.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }

    /// Let in-flight work finish, then stop the workers.
    pub async fn shutdown(mut self) {
        self.queue.wait_idle().await;
        self.queue.close();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker ended abnormally");
            }
        }
        info!("Orchestrator stopped");
    }
}

/// Errors meaning the job no longer applies to the submission (duplicate or
/// late job), as opposed to the submission itself failing.
fn is_stale(error: &OrchestratorError) -> bool {
    matches!(
        error,
        OrchestratorError::Store(
            StoreError::SubmissionNotFound(_)
                | StoreError::AlreadyCompleted(_)
                | StoreError::Domain(DomainError::InvalidTransition { .. })
        )
    )
}

/// Marks a job finished when dropped, so the pending count stays right
/// however the job ends.
struct JobDone<'a>(&'a JobHandle);

impl Drop for JobDone<'_> {
    fn drop(&mut self) {
        self.0.done();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "job panicked".to_string()
    }
}

async fn worker_loop(
    id: usize,
    context: Arc<GradingContext>,
    receiver: SharedReceiver,
    handle: JobHandle,
) {
    debug!(worker = id, "Worker started");
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            break;
        };

        let _done = JobDone(&handle);
        let submission_id = job.submission_id();
        debug!(worker = id, job = job.name(), submission_id = %submission_id, "Job picked up");
        let run = async {
            match job {
                Job::AcquireSources { submission_id } => {
                    acquire(&context, &handle, submission_id).await
                }
                Job::ExecuteSubmission { submission_id } => execute(&context, submission_id).await,
            }
        };
        let result = AssertUnwindSafe(run.instrument(obs::submission_span(submission_id)))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                error!(worker = id, job = job.name(), submission_id = %submission_id, "Job panicked");
                Err(OrchestratorError::Internal(panic_message(panic.as_ref())))
            });
        match result {
            Ok(()) => {}
            Err(e) if is_stale(&e) => {
                warn!(job = job.name(), submission_id = %submission_id, error = %e, "Job ignored");
            }
            Err(e) => fail_submission(&context, submission_id, e.to_string()).await,
        }
    }
    debug!(worker = id, "Worker stopped");
}

async fn acquire(
    context: &GradingContext,
    handle: &JobHandle,
    submission_id: SubmissionId,
) -> Result<(), OrchestratorError> {
    let status = SubmissionStatus::Processing(ProcessingPhase::Acquiring);
    context.submissions.set_status(submission_id, status).await?;
    obs::emit_submission_phase(submission_id, status);

    let submission = context.submissions.get(submission_id).await?;
    let assignment = context
        .assignments
        .assignment(submission.assignment_id)
        .await?;
    let staged = context.acquirer.acquire(&submission, &assignment).await?;

    if let Some(source_ref) = staged.source_ref {
        if submission.uploaded_source_ref.as_deref() != Some(source_ref.as_str()) {
            context
                .submissions
                .set_source_ref(submission_id, source_ref)
                .await?;
        }
    }

    handle.push(Job::ExecuteSubmission { submission_id })
}

async fn execute(
    context: &GradingContext,
    submission_id: SubmissionId,
) -> Result<(), OrchestratorError> {
    let status = SubmissionStatus::Processing(ProcessingPhase::Executing);
    context.submissions.set_status(submission_id, status).await?;
    obs::emit_submission_phase(submission_id, status);

    let submission = context.submissions.get(submission_id).await?;
    let assignment = context
        .assignments
        .assignment(submission.assignment_id)
        .await?;
    let rules = context.rules.rules_for(assignment.id).await?;

    // Mounting a missing directory would make the runtime create it as root.
    if let Err(e) = context.layout.ensure_attachments_dir(assignment.course_id) {
        warn!(course_id = %assignment.course_id, error = %e, "Could not prepare attachments directory");
    }

    let request = RunRequest {
        submission_id,
        environment_tag: assignment.environment_tag.clone(),
        source_dir: context
            .layout
            .host_store_dir(assignment.course_id, submission_id),
        attachments_dir: context.layout.host_attachments_dir(assignment.course_id),
    };
    let result = context.pipeline.run(&request, &rules).await?;
    if !result.cleaned_up {
        warn!(container = %result.container_name, "Container may not have been removed");
    }

    finish(context, &submission, result.into_outcome()).await?;
    Ok(())
}

async fn finish(
    context: &GradingContext,
    submission: &Submission,
    outcome: SubmissionOutcome,
) -> Result<Submission, StoreError> {
    let done = context.submissions.complete(submission.id, outcome).await?;
    let duration_ms = (Utc::now() - submission.created_at)
        .num_milliseconds()
        .max(0) as u64;
    obs::emit_submission_finished(done.id, done.status, duration_ms);
    Ok(done)
}

async fn fail_submission(
    context: &GradingContext,
    submission_id: SubmissionId,
    diagnostic: String,
) {
    warn!(submission_id = %submission_id, error = %diagnostic, "Submission failed");
    let submission = match context.submissions.get(submission_id).await {
        Ok(submission) => submission,
        Err(e) => {
            error!(submission_id = %submission_id, error = %e, "Cannot record failure");
            return;
        }
    };
    if submission.status.is_terminal() {
        return;
    }
    if let Err(e) = finish(
        context,
        &submission,
        SubmissionOutcome::failed(String::new(), diagnostic),
    )
    .await
    {
        error!(submission_id = %submission_id, error = %e, "Cannot record failure");
    }
}
