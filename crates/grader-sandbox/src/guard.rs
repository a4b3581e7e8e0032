//! Scoped container acquisition.
//!
//! A [`SessionGuard`] owns a started session. [`SessionGuard::finish`] stops
//! and removes the container and hands back the transcript. If the guard is
//! dropped instead (early return, `?`, panic), cleanup is spawned onto the
//! current tokio runtime.

use std::ops::{Deref, DerefMut};

use grader_core::obs;
use tracing::{debug, warn};

use crate::error::ContainerResult;
use crate::runtime::Mount;
use crate::session::{ContainerSession, SessionState};

/// Result of tearing a session down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    pub output: Vec<u8>,
    pub stop_code: i32,
    pub remove_code: i32,
    /// Whether the container is known to be gone.
    pub clean: bool,
}

impl Teardown {
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

#[derive(Debug)]
pub struct SessionGuard {
    session: ContainerSession,
    armed: bool,
}

impl SessionGuard {
    /// Start `session` and guard it. On failure nothing is left running.
    pub async fn start(
        mut session: ContainerSession,
        mounts: Vec<Mount>,
        entry_command: Vec<String>,
    ) -> ContainerResult<Self> {
        session.start(mounts, entry_command).await?;
        Ok(Self {
            session,
            armed: true,
        })
    }

    /// Stop then remove the container, force-removing if a graceful stop or
    /// remove fails. Never loses the transcript.
    pub async fn finish(mut self) -> Teardown {
        self.armed = false;
        let session = &mut self.session;

        let stop_code = match session.stop().await {
            Ok(code) => code,
            Err(e) => {
                warn!(container = %session.name(), error = %e, "Stop errored");
                -1
            }
        };

        let remove_code = if session.state() == SessionState::Stopped {
            match session.remove().await {
                Ok(code) => code,
                Err(e) => {
                    warn!(container = %session.name(), error = %e, "Remove errored");
                    -1
                }
            }
        } else {
            -1
        };

        if session.state() != SessionState::Removed {
            match session.force_remove().await {
                Ok(0) => {}
                Ok(code) => {
                    warn!(container = %session.name(), exit_code = code, "Force remove failed")
                }
                Err(e) => warn!(container = %session.name(), error = %e, "Force remove errored"),
            }
        }

        let clean = session.state() == SessionState::Removed;
        obs::emit_container_cleaned_up(session.name(), stop_code, remove_code);

        Teardown {
            output: session.take_output(),
            stop_code,
            remove_code,
            clean,
        }
    }
}

impl Deref for SessionGuard {
    type Target = ContainerSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.armed
            || matches!(
                self.session.state(),
                SessionState::Created | SessionState::Removed
            )
        {
            return;
        }

        let runtime = self.session.runtime();
        let name = self.session.name().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(container = %name, "Guard dropped; spawning cleanup");
                handle.spawn(async move {
                    match runtime.remove(&name, true).await {
                        Ok(out) if out.success() => {
                            obs::emit_container_cleaned_up(&name, -1, out.exit_code)
                        }
                        Ok(out) => {
                            warn!(container = %name, exit_code = out.exit_code, "Drop cleanup failed")
                        }
                        Err(e) => warn!(container = %name, error = %e, "Drop cleanup errored"),
                    }
                });
            }
            Err(_) => {
                warn!(container = %name, "Guard dropped outside a runtime; container may leak")
            }
        }
    }
}
