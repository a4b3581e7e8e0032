//! Typed jobs and the shared work queue.
//!
//! The queue is an unbounded channel, so enqueueing never blocks on grading.
//! Workers share the receiver and hold only weak senders; once the
//! orchestrator closes the queue and it drains, every worker sees the end of
//! the channel. A pending-job counter (queued plus running) backs
//! [`JobQueue::wait_idle`].

use std::sync::Arc;

use grader_core::SubmissionId;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::OrchestratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    AcquireSources { submission_id: SubmissionId },
    ExecuteSubmission { submission_id: SubmissionId },
}

impl Job {
    pub fn submission_id(&self) -> SubmissionId {
        match self {
            Job::AcquireSources { submission_id } | Job::ExecuteSubmission { submission_id } => {
                *submission_id
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Job::AcquireSources { .. } => "acquire_sources",
            Job::ExecuteSubmission { .. } => "execute_submission",
        }
    }
}

pub type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<Job>>>;

pub struct JobQueue {
    sender: Option<mpsc::UnboundedSender<Job>>,
    receiver: SharedReceiver,
    pending: Arc<watch::Sender<usize>>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0);
        Self {
            sender: Some(sender),
            receiver: Arc::new(Mutex::new(receiver)),
            pending: Arc::new(pending),
        }
    }

    pub fn push(&self, job: Job) -> Result<(), OrchestratorError> {
        let sender = self.sender.as_ref().ok_or(OrchestratorError::QueueClosed)?;
        send_counted(sender, &self.pending, job)
    }

    /// A weak handle for workers; `None` once closed.
    pub fn handle(&self) -> Option<JobHandle> {
        self.sender.as_ref().map(|sender| JobHandle {
            sender: sender.downgrade(),
            pending: Arc::clone(&self.pending),
        })
    }

    pub fn receiver(&self) -> SharedReceiver {
        Arc::clone(&self.receiver)
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolve once no job is queued or running.
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting jobs. Workers exit after draining what is queued.
    pub fn close(&mut self) {
        self.sender = None;
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }
}

fn send_counted(
    sender: &mpsc::UnboundedSender<Job>,
    pending: &watch::Sender<usize>,
    job: Job,
) -> Result<(), OrchestratorError> {
    pending.send_modify(|n| *n += 1);
    if sender.send(job).is_err() {
        pending.send_modify(|n| *n = n.saturating_sub(1));
        return Err(OrchestratorError::QueueClosed);
    }
    Ok(())
}

/// What a worker holds: enqueue follow-up jobs and report completion.
#[derive(Clone)]
pub struct JobHandle {
    sender: mpsc::WeakUnboundedSender<Job>,
    pending: Arc<watch::Sender<usize>>,
}

impl JobHandle {
    /// Enqueue a follow-up job. Must be called before [`done`](Self::done)
    /// for the job that produced it, so the queue never looks idle in
    /// between.
    pub fn push(&self, job: Job) -> Result<(), OrchestratorError> {
        let sender = self.sender.upgrade().ok_or(OrchestratorError::QueueClosed)?;
        send_counted(&sender, &self.pending, job)
    }

    /// Mark one job finished.
    pub fn done(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}
