//! Rule execution pipeline.
//!
//! One run = one sandbox session:
//!
//! 1. start `{submission_id}_{environment_tag}` from the environment image
//!    with the staged sources and course attachments mounted read-only
//! 2. copy student files, then teacher files, into the working directory
//! 3. run rules in ascending `order`, honouring timeout and
//!    continue-on-fail per rule
//! 4. tear the container down and return status plus transcript
//!
//! Rule failures are data. Sandbox faults after a successful start end the
//! run as `failed` with the partial transcript and a diagnostic.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use grader_core::obs;
use grader_core::{Rule, RuleId, SubmissionId, SubmissionOutcome, SubmissionStatus};
use grader_sandbox::{ContainerError, ContainerRuntime, ContainerSession, Mount, SessionGuard};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};

use crate::error::PipelineError;
use crate::rule::{host_timeout, rule_argv, timed_out};

/// Container-side layout and shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub student_mount: String,
    pub teacher_mount: String,
    pub workdir: String,
    pub shell: String,
    /// Keeps the container alive between execs.
    pub entry_command: Vec<String>,
    /// Host-side slack added to a rule's own timeout.
    pub exec_grace: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            student_mount: "/student-attachments".to_string(),
            teacher_mount: "/teacher-attachments".to_string(),
            workdir: "/src".to_string(),
            shell: "bash".to_string(),
            entry_command: vec!["bash".to_string()],
            exec_grace: Duration::from_secs(5),
        }
    }
}

impl PipelineSettings {
    pub fn with_exec_grace(mut self, grace: Duration) -> Self {
        self.exec_grace = grace;
        self
    }

    fn copy_script(&self, mount: &str) -> String {
        format!(
            "mkdir -p {workdir} && cp -r {mount}/. {workdir}/",
            workdir = self.workdir
        )
    }
}

/// What to run and where its inputs live on the container host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub submission_id: SubmissionId,
    pub environment_tag: String,
    pub source_dir: PathBuf,
    pub attachments_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: RuleId,
    pub title: String,
    pub order: u32,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl RuleOutcome {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub submission_id: SubmissionId,
    pub container_name: String,
    /// `Performed` or `Failed`.
    pub status: SubmissionStatus,
    /// Combined output of every exec, in order.
    pub transcript: String,
    pub outcomes: Vec<RuleOutcome>,
    /// Rules never attempted because an earlier rule stopped the run.
    pub skipped: Vec<RuleId>,
    /// Sandbox fault that cut the run short.
    pub fault: Option<String>,
    /// Whether the container is known to be gone.
    pub cleaned_up: bool,
}

impl PipelineResult {
    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    /// Diagnostic for `stderr`, empty when the run was performed.
    pub fn diagnostic(&self) -> String {
        if let Some(fault) = &self.fault {
            return fault.clone();
        }
        if self.status == SubmissionStatus::Failed {
            if let Some(last) = self.outcomes.last() {
                let reason = if last.timed_out {
                    "timed out".to_string()
                } else {
                    format!("exited with code {}", last.exit_code)
                };
                return format!("rule '{}' (order {}) {reason}", last.title, last.order);
            }
        }
        String::new()
    }

    pub fn into_outcome(self) -> SubmissionOutcome {
        match self.status {
            SubmissionStatus::Performed => SubmissionOutcome::performed(self.transcript),
            _ => {
                let diagnostic = self.diagnostic();
                SubmissionOutcome::failed(self.transcript, diagnostic)
            }
        }
    }
}

/// Progress collected while rules run, kept outside the fallible loop so a
/// fault does not lose it.
#[derive(Default)]
struct Progress {
    outcomes: Vec<RuleOutcome>,
    skipped: Vec<RuleId>,
    stopped: bool,
}

pub struct RulePipeline {
    runtime: Arc<dyn ContainerRuntime>,
    settings: PipelineSettings,
}

impl RulePipeline {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::with_settings(runtime, PipelineSettings::default())
    }

    pub fn with_settings(runtime: Arc<dyn ContainerRuntime>, settings: PipelineSettings) -> Self {
        Self { runtime, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn container_name(submission_id: SubmissionId, environment_tag: &str) -> String {
        format!("{submission_id}_{environment_tag}")
    }

    /// Run `rules` for one submission. Only a failed sandbox start is an
    /// `Err`; every later problem is folded into the result.
    pub async fn run(
        &self,
        request: &RunRequest,
        rules: &[Rule],
    ) -> Result<PipelineResult, PipelineError> {
        self.run_inner(request, rules)
            .instrument(obs::submission_span(request.submission_id))
            .await
    }

    async fn run_inner(
        &self,
        request: &RunRequest,
        rules: &[Rule],
    ) -> Result<PipelineResult, PipelineError> {
        let mut rules = rules.to_vec();
        rules.sort_by_key(|r| r.order);

        let name = Self::container_name(request.submission_id, &request.environment_tag);
        let session = ContainerSession::new(
            Arc::clone(&self.runtime),
            &request.environment_tag,
            &name,
        );
        let mounts = vec![
            Mount::read_only(&request.source_dir, &self.settings.student_mount),
            Mount::read_only(&request.attachments_dir, &self.settings.teacher_mount),
        ];

        let mut guard = SessionGuard::start(session, mounts, self.settings.entry_command.clone())
            .await
            .map_err(PipelineError::Start)?;

        let mut progress = Progress::default();
        let fault = match self.execute(&mut guard, &rules, &mut progress).await {
            Ok(()) => None,
            Err(e) => {
                warn!(container = %name, error = %e, "Sandbox fault during run");
                let attempted = progress.outcomes.len();
                progress.skipped = rules.iter().skip(attempted).map(|r| r.id).collect();
                Some(format!("sandbox error: {e}"))
            }
        };

        let teardown = guard.finish().await;
        let status = if progress.stopped || fault.is_some() {
            SubmissionStatus::Failed
        } else {
            SubmissionStatus::Performed
        };

        info!(
            container = %name,
            status = %status,
            rules_run = progress.outcomes.len(),
            skipped = progress.skipped.len(),
            "Pipeline finished"
        );

        Ok(PipelineResult {
            submission_id: request.submission_id,
            container_name: name,
            status,
            transcript: teardown.output_text(),
            outcomes: progress.outcomes,
            skipped: progress.skipped,
            fault,
            cleaned_up: teardown.clean,
        })
    }

    async fn execute(
        &self,
        guard: &mut SessionGuard,
        rules: &[Rule],
        progress: &mut Progress,
    ) -> Result<(), ContainerError> {
        let shell = self.settings.shell.as_str();

        // Teacher files are copied last so they win on name collisions.
        for mount in [&self.settings.student_mount, &self.settings.teacher_mount] {
            let script = self.settings.copy_script(mount);
            let status = guard
                .exec(shell, &["-c".to_string(), script], None)
                .await?;
            if !status.success() {
                warn!(mount = %mount, exit_code = status.exit_code, "Copying inputs failed");
            }
        }

        for (index, rule) in rules.iter().enumerate() {
            let argv = rule_argv(shell, rule);
            let status = guard
                .exec(
                    &argv[0],
                    &argv[1..],
                    host_timeout(rule, self.settings.exec_grace),
                )
                .await?;
            let exit_code = status.exit_code;
            let duration_ms = status.elapsed.as_millis() as u64;

            obs::emit_rule_finished(&rule.title, rule.order, exit_code, duration_ms);
            progress.outcomes.push(RuleOutcome {
                rule_id: rule.id,
                title: rule.title.clone(),
                order: rule.order,
                exit_code,
                timed_out: timed_out(rule, &status),
                duration_ms,
            });

            if exit_code != 0 && !rule.continue_on_fail {
                info!(rule = %rule.title, exit_code, "Rule failed; stopping");
                progress.stopped = true;
                progress.skipped = rules[index + 1..].iter().map(|r| r.id).collect();
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: SubmissionStatus, outcomes: Vec<RuleOutcome>, fault: Option<&str>) -> PipelineResult {
        PipelineResult {
            submission_id: SubmissionId(1),
            container_name: "1_gcc".into(),
            status,
            transcript: "out".into(),
            outcomes,
            skipped: vec![],
            fault: fault.map(str::to_string),
            cleaned_up: true,
        }
    }

    fn rule_outcome(title: &str, exit_code: i32, timed_out: bool) -> RuleOutcome {
        RuleOutcome {
            rule_id: RuleId(1),
            title: title.into(),
            order: 2,
            exit_code,
            timed_out,
            duration_ms: 1,
        }
    }

    #[test]
    fn test_container_name() {
        assert_eq!(RulePipeline::container_name(SubmissionId(42), "gcc-13"), "42_gcc-13");
    }

    #[test]
    fn test_copy_script() {
        let settings = PipelineSettings::default();
        assert_eq!(
            settings.copy_script("/student-attachments"),
            "mkdir -p /src && cp -r /student-attachments/. /src/"
        );
    }

    #[test]
    fn test_performed_outcome_has_empty_stderr() {
        let outcome = result(SubmissionStatus::Performed, vec![rule_outcome("build", 0, false)], None)
            .into_outcome();
        assert_eq!(outcome.status, SubmissionStatus::Performed);
        assert_eq!(outcome.stdout, "out");
        assert!(outcome.stderr.is_empty());
    }

    #[test]
    fn test_failed_outcome_names_rule() {
        let outcome = result(SubmissionStatus::Failed, vec![rule_outcome("compile", 2, false)], None)
            .into_outcome();
        assert_eq!(outcome.status, SubmissionStatus::Failed);
        assert_eq!(outcome.stderr, "rule 'compile' (order 2) exited with code 2");

        let outcome = result(SubmissionStatus::Failed, vec![rule_outcome("slow", 124, true)], None)
            .into_outcome();
        assert_eq!(outcome.stderr, "rule 'slow' (order 2) timed out");
    }

    #[test]
    fn test_fault_takes_precedence() {
        let outcome = result(
            SubmissionStatus::Failed,
            vec![rule_outcome("build", 0, false)],
            Some("sandbox error: lost"),
        )
        .into_outcome();
        assert_eq!(outcome.stderr, "sandbox error: lost");
        assert_eq!(outcome.stdout, "out");
    }
}
