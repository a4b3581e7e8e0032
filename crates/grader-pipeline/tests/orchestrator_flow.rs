//! End-to-end submission flow: in-memory stores, uploaded sources on a temp
//! media root, scripted container runtime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grader_core::{
    Assignment, AssignmentId, CourseId, MemoryAssignmentStore, MemorySubmissionStore, NewRule,
    NewSubmission, RuleBook, StorageLayout, Submission, SubmissionStatus, SubmissionStore, UserId,
};
use grader_pipeline::{GradingContext, Job, Orchestrator, OrchestratorError, RulePipeline};
use grader_sandbox::fakes::{RuntimeCall, ScriptedRuntime};
use grader_sources::{AcquisitionError, AcquisitionResult, SourceAcquirer, StagedSource, StrategyAcquirer};

struct Harness {
    _media: tempfile::TempDir,
    layout: StorageLayout,
    submissions: Arc<MemorySubmissionStore>,
    runtime: Arc<ScriptedRuntime>,
    orchestrator: Orchestrator,
}

fn assignment() -> Assignment {
    Assignment {
        id: AssignmentId(1),
        course_id: CourseId(2),
        title: "Lab 1".into(),
        environment_tag: "gcc".into(),
    }
}

fn scripted(compile_exit: i32) -> Arc<ScriptedRuntime> {
    let runtime = Arc::new(ScriptedRuntime::new());
    let compile_output = if compile_exit == 0 {
        "compiled\n"
    } else {
        "main.c:1: error: expected ';'\n"
    };
    runtime.respond("gcc main.c", compile_exit, compile_output);
    runtime.respond("./a.out", 0, "all tests passed\n");
    runtime
}

fn staging_acquirer(layout: &StorageLayout) -> StrategyAcquirer {
    StrategyAcquirer::new(layout.clone(), Duration::from_secs(5)).unwrap()
}

fn harness_with(
    acquirer: impl FnOnce(&StorageLayout) -> Arc<dyn SourceAcquirer>,
    runtime: Arc<ScriptedRuntime>,
    workers: usize,
) -> Harness {
    let media = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(media.path());

    let submissions = Arc::new(MemorySubmissionStore::new());
    let assignments = Arc::new(MemoryAssignmentStore::new());
    assignments.insert(assignment());

    let rules = Arc::new(RuleBook::new());
    rules
        .create(NewRule::new(AssignmentId(1), "compile", "gcc main.c").stop_on_fail())
        .unwrap();
    rules
        .create(NewRule::new(AssignmentId(1), "test", "./a.out").with_timeout(10))
        .unwrap();

    let acquirer = acquirer(&layout);

    let context = GradingContext {
        submissions: submissions.clone(),
        assignments,
        rules,
        acquirer,
        pipeline: Arc::new(RulePipeline::new(runtime.clone())),
        layout: layout.clone(),
    };
    let orchestrator = Orchestrator::start(context, workers).unwrap();

    Harness {
        _media: media,
        layout,
        submissions,
        runtime,
        orchestrator,
    }
}

fn harness(workers: usize) -> Harness {
    harness_with(|layout| Arc::new(staging_acquirer(layout)), scripted(0), workers)
}

async fn upload(h: &Harness, user: u64) -> Submission {
    let source_ref = h.layout.stage_upload("main.c", b"int main(){}").unwrap();
    h.orchestrator
        .submit(NewSubmission::uploaded(AssignmentId(1), UserId(user), &source_ref))
        .await
        .unwrap()
}

#[tokio::test]
async fn uploaded_submission_is_performed() {
    let h = harness(2);
    let submission = upload(&h, 7).await;
    assert_eq!(submission.status, SubmissionStatus::Pending);

    h.orchestrator.wait_idle().await;
    let done = h.submissions.get(submission.id).await.unwrap();

    assert_eq!(done.status, SubmissionStatus::Performed);
    assert_eq!(done.stdout, "compiled\nall tests passed\n");
    assert!(done.stderr.is_empty());
    assert_eq!(
        done.uploaded_source_ref.as_deref(),
        Some(format!("courses/course_2/submissions/submission_{}/main.c", submission.id).as_str())
    );
    assert!(h
        .layout
        .store_dir(CourseId(2), submission.id)
        .join("main.c")
        .exists());
    assert!(h.runtime.containers().is_empty());

    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn failing_rule_marks_submission_failed() {
    let h = harness_with(|layout| Arc::new(staging_acquirer(layout)), scripted(1), 1);
    let submission = upload(&h, 8).await;
    h.orchestrator.wait_idle().await;

    let done = h.submissions.get(submission.id).await.unwrap();
    assert_eq!(done.status, SubmissionStatus::Failed);
    assert_eq!(done.stdout, "main.c:1: error: expected ';'\n");
    assert_eq!(done.stderr, "rule 'compile' (order 1) exited with code 1");
    assert!(!h.runtime.exec_scripts().contains(&"./a.out".to_string()));
    assert!(h.runtime.containers().is_empty());

    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn acquisition_failure_never_executes() {
    let h = harness(2);
    let submission = h
        .orchestrator
        .submit(NewSubmission::uploaded(
            AssignmentId(1),
            UserId(9),
            "tmp/tmp_missing0/main.c",
        ))
        .await
        .unwrap();
    h.orchestrator.wait_idle().await;

    let done = h.submissions.get(submission.id).await.unwrap();
    assert_eq!(done.status, SubmissionStatus::Failed);
    assert!(done.stdout.is_empty());
    assert!(done.stderr.starts_with("source acquisition failed"));
    assert!(h.runtime.calls().is_empty());

    h.orchestrator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_submissions_all_finish_in_parallel() {
    let h = harness(3);
    let mut ids = Vec::new();
    for user in 0..8 {
        ids.push(upload(&h, user).await.id);
    }
    h.orchestrator.wait_idle().await;

    for id in &ids {
        let done = h.submissions.get(*id).await.unwrap();
        assert_eq!(done.status, SubmissionStatus::Performed, "submission {id}");
    }

    let mut started: Vec<String> = h
        .runtime
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RuntimeCall::Run { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    started.sort();
    started.dedup();
    assert_eq!(started.len(), ids.len());
    assert!(h.runtime.containers().is_empty());

    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn start_failure_fails_submission_with_diagnostic() {
    let h = harness(1);
    h.runtime.fail_start();
    let submission = upload(&h, 4).await;
    h.orchestrator.wait_idle().await;

    let done = h.submissions.get(submission.id).await.unwrap();
    assert_eq!(done.status, SubmissionStatus::Failed);
    assert!(done.stderr.contains("failed to start sandbox"));
    assert!(h.runtime.containers().is_empty());

    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn stale_execute_job_is_ignored() {
    let h = harness(1);
    let submission = upload(&h, 5).await;
    h.orchestrator.wait_idle().await;

    h.orchestrator
        .enqueue(Job::ExecuteSubmission {
            submission_id: submission.id,
        })
        .unwrap();
    h.orchestrator.wait_idle().await;

    let done = h.submissions.get(submission.id).await.unwrap();
    assert_eq!(done.status, SubmissionStatus::Performed);

    h.orchestrator.shutdown().await;
}

struct Unreachable;

#[async_trait]
impl SourceAcquirer for Unreachable {
    async fn acquire(
        &self,
        _submission: &Submission,
        _assignment: &Assignment,
    ) -> AcquisitionResult<StagedSource> {
        Err(AcquisitionError::download(
            "https://git.example.org/acme/lab1/tarball/main",
            "HTTP 503 Service Unavailable",
        ))
    }
}

#[tokio::test]
async fn download_error_is_recorded() {
    let h = harness_with(|_| Arc::new(Unreachable), scripted(0), 1);
    let submission = h
        .orchestrator
        .submit(NewSubmission::repository(
            AssignmentId(1),
            UserId(3),
            "git.example.org/acme/lab1",
            "main",
        ))
        .await
        .unwrap();
    h.orchestrator.wait_idle().await;

    let done = h.submissions.get(submission.id).await.unwrap();
    assert_eq!(done.status, SubmissionStatus::Failed);
    assert!(done.stderr.contains("503"));
    assert!(h.runtime.calls().is_empty());

    h.orchestrator.shutdown().await;
}

/// Stages sources normally, except for one user whose acquisition panics.
struct PanicsFor {
    user: UserId,
    inner: StrategyAcquirer,
}

#[async_trait]
impl SourceAcquirer for PanicsFor {
    async fn acquire(
        &self,
        submission: &Submission,
        assignment: &Assignment,
    ) -> AcquisitionResult<StagedSource> {
        if submission.user_id == self.user {
            panic!("archive index out of bounds");
        }
        self.inner.acquire(submission, assignment).await
    }
}

#[tokio::test]
async fn panicking_job_fails_only_its_submission() {
    let h = harness_with(
        |layout| {
            Arc::new(PanicsFor {
                user: UserId(1),
                inner: staging_acquirer(layout),
            })
        },
        scripted(0),
        1,
    );

    let doomed = upload(&h, 1).await;
    tokio::time::timeout(Duration::from_secs(5), h.orchestrator.wait_idle())
        .await
        .expect("queue should drain after a panicking job");
    assert_eq!(h.orchestrator.pending(), 0);

    let done = h.submissions.get(doomed.id).await.unwrap();
    assert_eq!(done.status, SubmissionStatus::Failed);
    assert_eq!(done.stderr, "internal error: archive index out of bounds");
    assert!(h.runtime.calls().is_empty());

    // The only worker is still serving the queue.
    let next = upload(&h, 2).await;
    tokio::time::timeout(Duration::from_secs(5), h.orchestrator.wait_idle())
        .await
        .expect("worker should survive the panic");
    let done = h.submissions.get(next.id).await.unwrap();
    assert_eq!(done.status, SubmissionStatus::Performed);

    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn zero_workers_rejected() {
    let media = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(media.path());
    let context = GradingContext {
        submissions: Arc::new(MemorySubmissionStore::new()),
        assignments: Arc::new(MemoryAssignmentStore::new()),
        rules: Arc::new(RuleBook::new()),
        acquirer: Arc::new(StrategyAcquirer::new(layout.clone(), Duration::from_secs(5)).unwrap()),
        pipeline: Arc::new(RulePipeline::new(Arc::new(ScriptedRuntime::new()))),
        layout,
    };
    assert!(matches!(
        Orchestrator::start(context, 0),
        Err(OrchestratorError::InvalidConfig(_))
    ));
}
