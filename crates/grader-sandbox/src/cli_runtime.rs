//! Container runtime backed by the `docker` (or compatible) CLI.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{CommandOutput, ContainerRuntime, ContainerSpec};

const READ_CHUNK: usize = 8192;

/// Shells out to a docker-compatible binary for every operation.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    binary: String,
}

impl Default for CliRuntime {
    fn default() -> Self {
        Self::docker()
    }
}

impl CliRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn docker() -> Self {
        Self::new("docker")
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn invoke(
        &self,
        args: Vec<String>,
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> RuntimeResult<CommandOutput> {
        debug!(binary = %self.binary, args = ?args, "Invoking container runtime");
        let started = Instant::now();

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
            pipe.shutdown().await?;
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut combined = Vec::new();

        let finished = match timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, drain_combined(stdout, stderr, &mut combined))
                    .await
                {
                    Ok(drained) => {
                        drained?;
                        true
                    }
                    Err(_) => false,
                }
            }
            None => {
                drain_combined(stdout, stderr, &mut combined).await?;
                true
            }
        };

        if !finished {
            warn!(binary = %self.binary, args = ?args, "Command timed out; killing");
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "Failed to signal timed out command");
            }
            let _ = child.wait().await;
            return Ok(CommandOutput::timed_out(combined).with_elapsed(started.elapsed()));
        }

        let status = child.wait().await?;
        Ok(CommandOutput::new(status.code().unwrap_or(-1), combined).with_elapsed(started.elapsed()))
    }
}

/// Read stdout and stderr concurrently into one buffer until both close.
///
/// `combined` lives outside this future so partial output survives a
/// cancelled drain.
async fn drain_combined<O, E>(
    mut stdout: Option<O>,
    mut stderr: Option<E>,
    combined: &mut Vec<u8>,
) -> std::io::Result<()>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];

    while stdout.is_some() || stderr.is_some() {
        let (from_stdout, read) = tokio::select! {
            n = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => (true, n?),
            n = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => (false, n?),
        };
        match (from_stdout, read) {
            (true, 0) => stdout = None,
            (false, 0) => stderr = None,
            (true, n) => combined.extend_from_slice(&out_buf[..n]),
            (false, n) => combined.extend_from_slice(&err_buf[..n]),
        }
    }
    Ok(())
}

async fn read_some<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => Ok(0),
    }
}

fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        format!("--name={}", spec.name),
        "-i".to_string(),
        "-d".to_string(),
    ];
    args.extend(spec.mounts.iter().map(|m| m.to_volume_arg()));
    args.push(spec.image.clone());
    args.extend(spec.entry_command.iter().cloned());
    args
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn run_detached(&self, spec: &ContainerSpec) -> RuntimeResult<CommandOutput> {
        self.invoke(run_args(spec), None, None).await
    }

    async fn exec(
        &self,
        name: &str,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> RuntimeResult<CommandOutput> {
        let mut args = vec!["exec".to_string(), name.to_string()];
        args.extend(argv.iter().cloned());
        self.invoke(args, None, timeout).await
    }

    async fn stop(&self, name: &str) -> RuntimeResult<CommandOutput> {
        self.invoke(vec!["stop".into(), name.into()], None, None)
            .await
    }

    async fn remove(&self, name: &str, force: bool) -> RuntimeResult<CommandOutput> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("-f".into());
        }
        args.push(name.into());
        self.invoke(args, None, None).await
    }

    async fn build_image(&self, tag: &str, dockerfile: &str) -> RuntimeResult<CommandOutput> {
        let args = vec![
            "build".to_string(),
            "-q".into(),
            "-t".into(),
            tag.into(),
            "-".into(),
        ];
        self.invoke(args, Some(dockerfile.as_bytes()), None).await
    }

    async fn remove_image(&self, tag: &str) -> RuntimeResult<CommandOutput> {
        self.invoke(vec!["rmi".into(), tag.into()], None, None)
            .await
    }
}
