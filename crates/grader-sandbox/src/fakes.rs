//! In-memory container runtime for tests.
//!
//! `ScriptedRuntime` tracks containers and images the way a docker daemon
//! would (names are unique, running containers refuse a plain `rm`) and
//! answers `exec` calls from scripted responses. Time is simulated: a
//! response's `duration` is compared against the command's timeouts instead
//! of being slept.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{CommandOutput, ContainerRuntime, ContainerSpec, Mount, TIMEOUT_EXIT_CODE};

/// Every call made against the fake, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Run {
        name: String,
        image: String,
        mounts: Vec<Mount>,
    },
    Exec {
        name: String,
        argv: Vec<String>,
        timeout: Option<Duration>,
    },
    Stop {
        name: String,
    },
    Remove {
        name: String,
        force: bool,
    },
    Build {
        tag: String,
    },
    RemoveImage {
        tag: String,
    },
}

#[derive(Debug, Clone)]
struct Scripted {
    needle: String,
    exit_code: i32,
    output: Vec<u8>,
    duration: Duration,
    broken: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    /// name -> running
    containers: BTreeMap<String, bool>,
    images: BTreeSet<String>,
    calls: Vec<RuntimeCall>,
    scripts: Vec<Scripted>,
    fail_start: bool,
    fail_stop: bool,
    failing_builds: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    state: Mutex<FakeState>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn script(&self, scripted: Scripted) {
        self.with_state(|s| s.scripts.push(scripted));
    }

    /// Answer any exec whose joined argv contains `needle`. Earlier
    /// registrations win.
    pub fn respond(&self, needle: &str, exit_code: i32, output: &str) {
        self.respond_after(needle, exit_code, output, Duration::ZERO);
    }

    /// Like [`respond`](Self::respond), for a command that runs for `duration`.
    pub fn respond_after(&self, needle: &str, exit_code: i32, output: &str, duration: Duration) {
        self.script(Scripted {
            needle: needle.to_string(),
            exit_code,
            output: output.as_bytes().to_vec(),
            duration,
            broken: false,
        });
    }

    /// Make matching execs fail at the runtime level.
    pub fn break_exec(&self, needle: &str) {
        self.script(Scripted {
            needle: needle.to_string(),
            exit_code: 0,
            output: Vec::new(),
            duration: Duration::ZERO,
            broken: true,
        });
    }

    /// `run` creates the container but fails to start it.
    pub fn fail_start(&self) {
        self.with_state(|s| s.fail_start = true);
    }

    /// `stop` reports failure and leaves the container running.
    pub fn fail_stop(&self) {
        self.with_state(|s| s.fail_stop = true);
    }

    pub fn fail_build(&self, tag: &str) {
        self.with_state(|s| s.failing_builds.insert(tag.to_string()));
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.with_state(|s| s.calls.clone())
    }

    /// The final argv element of each exec, i.e. the script handed to the shell.
    pub fn exec_scripts(&self) -> Vec<String> {
        self.with_state(|s| {
            s.calls
                .iter()
                .filter_map(|c| match c {
                    RuntimeCall::Exec { argv, .. } => argv.last().cloned(),
                    _ => None,
                })
                .collect()
        })
    }

    /// Existing containers, running or not.
    pub fn containers(&self) -> Vec<String> {
        self.with_state(|s| s.containers.keys().cloned().collect())
    }

    pub fn running_containers(&self) -> Vec<String> {
        self.with_state(|s| {
            s.containers
                .iter()
                .filter(|(_, running)| **running)
                .map(|(name, _)| name.clone())
                .collect()
        })
    }

    pub fn images(&self) -> Vec<String> {
        self.with_state(|s| s.images.iter().cloned().collect())
    }
}

/// In-container limit from a leading `timeout <secs>`.
fn inner_timeout(argv: &[String]) -> Option<Duration> {
    match argv {
        [cmd, secs, ..] if cmd == "timeout" => secs.parse().ok().map(Duration::from_secs),
        _ => None,
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn run_detached(&self, spec: &ContainerSpec) -> RuntimeResult<CommandOutput> {
        Ok(self.with_state(|s| {
            s.calls.push(RuntimeCall::Run {
                name: spec.name.clone(),
                image: spec.image.clone(),
                mounts: spec.mounts.clone(),
            });
            if s.containers.contains_key(&spec.name) {
                return CommandOutput::new(
                    125,
                    format!("Conflict. The container name \"/{}\" is already in use\n", spec.name),
                );
            }
            if s.fail_start {
                s.containers.insert(spec.name.clone(), false);
                return CommandOutput::new(125, "failed to start container\n");
            }
            s.containers.insert(spec.name.clone(), true);
            CommandOutput::new(0, format!("{}\n", spec.name))
        }))
    }

    async fn exec(
        &self,
        name: &str,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> RuntimeResult<CommandOutput> {
        let scripted = self.with_state(|s| {
            s.calls.push(RuntimeCall::Exec {
                name: name.to_string(),
                argv: argv.to_vec(),
                timeout,
            });
            match s.containers.get(name) {
                None => {
                    return Err(CommandOutput::new(
                        1,
                        format!("Error: No such container: {name}\n"),
                    ))
                }
                Some(false) => {
                    return Err(CommandOutput::new(
                        1,
                        format!("Error: container {name} is not running\n"),
                    ))
                }
                Some(true) => {}
            }
            let joined = argv.join(" ");
            Ok(s
                .scripts
                .iter()
                .find(|script| joined.contains(&script.needle))
                .cloned())
        });

        let scripted = match scripted {
            Ok(scripted) => scripted,
            Err(rejected) => return Ok(rejected),
        };
        let Some(script) = scripted else {
            return Ok(CommandOutput::new(0, Vec::new()));
        };
        if script.broken {
            return Err(RuntimeError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("lost connection to {name}"),
            )));
        }

        let inner = inner_timeout(argv);
        match (inner, timeout) {
            (Some(limit), host) if script.duration > limit && host.map_or(true, |h| limit <= h) => {
                Ok(CommandOutput::new(TIMEOUT_EXIT_CODE, script.output).with_elapsed(limit))
            }
            (_, Some(host)) if script.duration > host => {
                Ok(CommandOutput::timed_out(script.output).with_elapsed(host))
            }
            _ => Ok(CommandOutput::new(script.exit_code, script.output).with_elapsed(script.duration)),
        }
    }

    async fn stop(&self, name: &str) -> RuntimeResult<CommandOutput> {
        Ok(self.with_state(|s| {
            s.calls.push(RuntimeCall::Stop {
                name: name.to_string(),
            });
            if s.fail_stop {
                return CommandOutput::new(1, "stop failed\n");
            }
            match s.containers.get_mut(name) {
                Some(running) => {
                    *running = false;
                    CommandOutput::new(0, format!("{name}\n"))
                }
                None => CommandOutput::new(1, format!("Error: No such container: {name}\n")),
            }
        }))
    }

    async fn remove(&self, name: &str, force: bool) -> RuntimeResult<CommandOutput> {
        Ok(self.with_state(|s| {
            s.calls.push(RuntimeCall::Remove {
                name: name.to_string(),
                force,
            });
            match s.containers.get(name).copied() {
                None => CommandOutput::new(1, format!("Error: No such container: {name}\n")),
                Some(true) if !force => CommandOutput::new(
                    1,
                    format!("Error: cannot remove running container {name}\n"),
                ),
                Some(_) => {
                    s.containers.remove(name);
                    CommandOutput::new(0, format!("{name}\n"))
                }
            }
        }))
    }

    async fn build_image(&self, tag: &str, _dockerfile: &str) -> RuntimeResult<CommandOutput> {
        Ok(self.with_state(|s| {
            s.calls.push(RuntimeCall::Build {
                tag: tag.to_string(),
            });
            if s.failing_builds.contains(tag) {
                return CommandOutput::new(1, "build failed\n");
            }
            s.images.insert(tag.to_string());
            CommandOutput::new(0, format!("sha256:{tag}\n"))
        }))
    }

    async fn remove_image(&self, tag: &str) -> RuntimeResult<CommandOutput> {
        Ok(self.with_state(|s| {
            s.calls.push(RuntimeCall::RemoveImage {
                tag: tag.to_string(),
            });
            if s.images.remove(tag) {
                CommandOutput::new(0, format!("Untagged: {tag}\n"))
            } else {
                CommandOutput::new(1, format!("Error: No such image: {tag}\n"))
            }
        }))
    }
}
