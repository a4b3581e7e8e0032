//! Sandbox: container lifecycle control for submission grading.
//!
//! A [`ContainerSession`] drives one named container through a strictly
//! linear lifecycle (`created -> running -> stopped -> removed`) on top of a
//! pluggable [`ContainerRuntime`]. [`SessionGuard`] ties the session to a
//! scope so the container is stopped and removed on every exit path.
//!
//! # Modules
//!
//! - [`runtime`]    : `ContainerRuntime` trait, `ContainerSpec`, `Mount`
//! - [`cli_runtime`]: `CliRuntime` driving the `docker`/`podman` CLI
//! - [`session`]    : `ContainerSession` (start/exec/stop/remove)
//! - [`guard`]      : `SessionGuard` scoped acquisition
//! - [`image`]      : `EnvironmentBuilder` for environment images
//! - [`fakes`]      : `ScriptedRuntime` in-memory runtime
//! - [`error`]      : `RuntimeError` / `ContainerError`

pub mod cli_runtime;
pub mod error;
pub mod fakes;
pub mod guard;
pub mod image;
pub mod runtime;
pub mod session;

pub use cli_runtime::CliRuntime;
pub use error::{ContainerError, ContainerResult, RuntimeError, RuntimeResult};
pub use guard::{SessionGuard, Teardown};
pub use image::{BuildReport, EnvironmentBuilder};
pub use runtime::{
    CommandOutput, ContainerRuntime, ContainerSpec, Mount, MountMode, TIMEOUT_EXIT_CODE,
};
pub use session::{ContainerSession, ExecStatus, SessionState};
