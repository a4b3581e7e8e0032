//! Container runtime seam.
//!
//! Everything above this trait (sessions, guards, the rule pipeline) is
//! runtime-agnostic. [`CliRuntime`](crate::CliRuntime) drives a real
//! `docker`/`podman` binary; [`ScriptedRuntime`](crate::fakes::ScriptedRuntime)
//! backs the test suites.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeResult;

/// Exit code reported for a command killed on timeout, matching coreutils
/// `timeout`.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountMode {
    ReadOnly,
    ReadWrite,
}

impl MountMode {
    pub fn as_flag(&self) -> &'static str {
        match self {
            MountMode::ReadOnly => "ro",
            MountMode::ReadWrite => "rw",
        }
    }
}

/// A host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub mode: MountMode,
}

impl Mount {
    pub fn read_only(host_path: impl Into<PathBuf>, container_path: &str) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.to_string(),
            mode: MountMode::ReadOnly,
        }
    }

    /// `--volume=<host>:<container>:<mode>`
    pub fn to_volume_arg(&self) -> String {
        format!(
            "--volume={}:{}:{}",
            self.host_path.display(),
            self.container_path,
            self.mode.as_flag()
        )
    }
}

/// Everything needed to launch a detached, interactive container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub mounts: Vec<Mount>,
    /// Keeps the container alive, e.g. `["bash"]` with stdin held open.
    pub entry_command: Vec<String>,
}

/// Exit status plus combined stdout/stderr, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: Vec<u8>,
    /// Killed by the host after the caller's timeout elapsed.
    pub timed_out: bool,
    /// Wall time the command ran for.
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn new(exit_code: i32, output: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            timed_out: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn timed_out(output: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            output: output.into(),
            timed_out: true,
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Operations the sandbox needs from a container engine.
///
/// Non-zero exit codes are reported through [`CommandOutput`]; `Err` is
/// reserved for failing to talk to the runtime at all.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a detached container.
    async fn run_detached(&self, spec: &ContainerSpec) -> RuntimeResult<CommandOutput>;

    /// Run `argv` inside a running container. When `timeout` elapses the
    /// exec is killed and reported with [`TIMEOUT_EXIT_CODE`].
    async fn exec(
        &self,
        name: &str,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> RuntimeResult<CommandOutput>;

    async fn stop(&self, name: &str) -> RuntimeResult<CommandOutput>;

    /// Remove a container; `force` also kills a running one.
    async fn remove(&self, name: &str, force: bool) -> RuntimeResult<CommandOutput>;

    /// Build an image from Dockerfile content.
    async fn build_image(&self, tag: &str, dockerfile: &str) -> RuntimeResult<CommandOutput>;

    async fn remove_image(&self, tag: &str) -> RuntimeResult<CommandOutput>;
}
