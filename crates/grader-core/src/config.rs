//! Grader configuration.
//!
//! Values default from environment variables so a deployment can be
//! configured without flags:
//!
//! | Variable                    | Default           |
//! |-----------------------------|-------------------|
//! | `GRADER_MEDIA_ROOT`         | `./media`         |
//! | `GRADER_HOST_MEDIA_ROOT`    | unset             |
//! | `GRADER_WORKERS`            | `4`               |
//! | `GRADER_CONTAINER_BINARY`   | `docker`          |
//! | `GRADER_HTTP_TIMEOUT_SECS`  | `120`             |
//! | `GRADER_EXEC_GRACE_SECS`    | `5`               |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::layout::StorageLayout;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraderConfig {
    /// Root under which courses, submissions and temporary uploads live.
    pub media_root: PathBuf,
    /// Same root as seen by the container host, if different.
    pub host_media_root: Option<PathBuf>,
    /// Size of the background worker pool.
    pub workers: usize,
    /// Container runtime CLI (`docker`, `podman`, ...).
    pub container_binary: String,
    /// Overall timeout for repository downloads.
    pub http_timeout_secs: u64,
    /// Extra host-side slack on top of a rule's in-container timeout.
    pub exec_grace_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for GraderConfig {
    fn default() -> Self {
        GraderConfig {
            media_root: std::env::var("GRADER_MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./media")),
            host_media_root: std::env::var("GRADER_HOST_MEDIA_ROOT")
                .ok()
                .map(PathBuf::from),
            workers: env_or("GRADER_WORKERS", 4),
            container_binary: std::env::var("GRADER_CONTAINER_BINARY")
                .unwrap_or_else(|_| "docker".to_string()),
            http_timeout_secs: env_or("GRADER_HTTP_TIMEOUT_SECS", 120),
            exec_grace_secs: env_or("GRADER_EXEC_GRACE_SECS", 5),
        }
    }
}

impl GraderConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_media_root(mut self, media_root: impl Into<PathBuf>) -> Self {
        self.media_root = media_root.into();
        self
    }

    pub fn with_host_media_root(mut self, host_media_root: impl Into<PathBuf>) -> Self {
        self.host_media_root = Some(host_media_root.into());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_container_binary(mut self, binary: &str) -> Self {
        self.container_binary = binary.to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(DomainError::InvalidConfig(
                "workers must be at least 1".into(),
            ));
        }
        if self.container_binary.trim().is_empty() {
            return Err(DomainError::InvalidConfig(
                "container binary must not be empty".into(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(DomainError::InvalidConfig(
                "http timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn layout(&self) -> StorageLayout {
        let layout = StorageLayout::new(&self.media_root);
        match &self.host_media_root {
            Some(host) => layout.with_host_media_root(host),
            None => layout,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn exec_grace(&self) -> Duration {
        Duration::from_secs(self.exec_grace_secs)
    }
}
