//! A single named container and its lifecycle.
//!
//! ```text
//! created --start--> running --stop--> stopped --remove--> removed
//!                       |                                     |
//!                      exec                                 start
//! ```
//!
//! Every `exec` appends its combined output to one transcript buffer, so the
//! session's captured output is a faithful log of everything run inside it.

use std::sync::Arc;
use std::time::Duration;

use grader_core::obs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ContainerError, ContainerResult};
use crate::runtime::{ContainerRuntime, ContainerSpec, Mount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Running,
    Stopped,
    Removed,
}

/// How one exec ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecStatus {
    pub exit_code: i32,
    /// The runtime killed the exec when its host-side timeout elapsed.
    pub killed: bool,
    pub elapsed: Duration,
}

impl ExecStatus {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.killed
    }
}

pub struct ContainerSession {
    runtime: Arc<dyn ContainerRuntime>,
    image: String,
    name: String,
    state: SessionState,
    output: Vec<u8>,
}

impl std::fmt::Debug for ContainerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerSession")
            .field("image", &self.image)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("output_bytes", &self.output.len())
            .finish()
    }
}

impl ContainerSession {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image: &str, name: &str) -> Self {
        Self {
            runtime,
            image: image.to_string(),
            name: name.to_string(),
            state: SessionState::Created,
            output: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub(crate) fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        Arc::clone(&self.runtime)
    }

    /// Everything captured so far, stdout and stderr interleaved.
    pub fn captured_output(&self) -> &[u8] {
        &self.output
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Launch the container detached with the given read-only mounts.
    ///
    /// Fails with `AlreadyRunning` while a previous container of this session
    /// still exists. A failed launch leaves nothing behind.
    pub async fn start(
        &mut self,
        mounts: Vec<Mount>,
        entry_command: Vec<String>,
    ) -> ContainerResult<()> {
        if matches!(self.state, SessionState::Running | SessionState::Stopped) {
            return Err(ContainerError::AlreadyRunning {
                name: self.name.clone(),
            });
        }

        let spec = ContainerSpec {
            image: self.image.clone(),
            name: self.name.clone(),
            mounts,
            entry_command,
        };
        let out = self.runtime.run_detached(&spec).await?;
        if !out.success() {
            // `run` may have created the container before failing to start it.
            if let Err(e) = self.runtime.remove(&self.name, true).await {
                warn!(container = %self.name, error = %e, "Cleanup after failed start failed");
            }
            return Err(ContainerError::StartFailed {
                name: self.name.clone(),
                exit_code: out.exit_code,
                message: out.text().trim().to_string(),
            });
        }

        self.state = SessionState::Running;
        obs::emit_container_started(&self.name, &self.image);
        Ok(())
    }

    /// Run `command args...` inside the container.
    pub async fn exec(
        &mut self,
        command: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> ContainerResult<ExecStatus> {
        if !self.is_running() {
            return Err(ContainerError::NotRunning {
                name: self.name.clone(),
            });
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(command.to_string());
        argv.extend(args.iter().cloned());

        let out = self.runtime.exec(&self.name, &argv, timeout).await?;
        self.output.extend_from_slice(&out.output);
        debug!(
            container = %self.name,
            exit_code = out.exit_code,
            timed_out = out.timed_out,
            bytes = out.output.len(),
            "Exec finished"
        );
        Ok(ExecStatus {
            exit_code: out.exit_code,
            killed: out.timed_out,
            elapsed: out.elapsed,
        })
    }

    /// Stop the container. A no-op returning `0` when it is not running.
    pub async fn stop(&mut self) -> ContainerResult<i32> {
        if !self.is_running() {
            debug!(container = %self.name, state = ?self.state, "Stop skipped; not running");
            return Ok(0);
        }
        let out = self.runtime.stop(&self.name).await?;
        if out.success() {
            self.state = SessionState::Stopped;
        } else {
            warn!(container = %self.name, exit_code = out.exit_code, "Stop failed");
        }
        Ok(out.exit_code)
    }

    /// Remove a stopped container. Fails with `StillRunning` if it is up.
    pub async fn remove(&mut self) -> ContainerResult<i32> {
        match self.state {
            SessionState::Running => Err(ContainerError::StillRunning {
                name: self.name.clone(),
            }),
            SessionState::Created | SessionState::Removed => Ok(0),
            SessionState::Stopped => {
                let out = self.runtime.remove(&self.name, false).await?;
                if out.success() {
                    self.state = SessionState::Removed;
                } else {
                    warn!(container = %self.name, exit_code = out.exit_code, "Remove failed");
                }
                Ok(out.exit_code)
            }
        }
    }

    /// Kill and remove regardless of state. Used when a graceful stop fails.
    pub async fn force_remove(&mut self) -> ContainerResult<i32> {
        if matches!(self.state, SessionState::Created | SessionState::Removed) {
            return Ok(0);
        }
        let out = self.runtime.remove(&self.name, true).await?;
        if out.success() {
            self.state = SessionState::Removed;
        }
        Ok(out.exit_code)
    }
}
