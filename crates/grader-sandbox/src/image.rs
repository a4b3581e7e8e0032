//! Building and removing environment images.

use std::sync::Arc;

use grader_core::{Environment, EnvironmentStatus};
use tracing::{info, warn};

use crate::error::ContainerResult;
use crate::runtime::ContainerRuntime;

/// Outcome of an image build: the new status plus the builder's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub status: EnvironmentStatus,
    pub exit_code: i32,
    pub output: String,
}

pub struct EnvironmentBuilder {
    runtime: Arc<dyn ContainerRuntime>,
}

impl EnvironmentBuilder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Build `env`'s image from its Dockerfile content and record the
    /// resulting status on it.
    pub async fn build(&self, env: &mut Environment) -> ContainerResult<BuildReport> {
        env.status = EnvironmentStatus::Processing;
        let out = match self
            .runtime
            .build_image(&env.tag, &env.dockerfile_content)
            .await
        {
            Ok(out) => out,
            Err(e) => {
                env.status = EnvironmentStatus::Failed;
                return Err(e.into());
            }
        };

        env.status = if out.success() {
            info!(tag = %env.tag, "Environment image built");
            EnvironmentStatus::Created
        } else {
            warn!(tag = %env.tag, exit_code = out.exit_code, "Environment image build failed");
            EnvironmentStatus::Failed
        };

        Ok(BuildReport {
            status: env.status,
            exit_code: out.exit_code,
            output: out.text(),
        })
    }

    /// Remove the image for `tag`. Returns whether the runtime removed it.
    pub async fn remove(&self, tag: &str) -> ContainerResult<bool> {
        let out = self.runtime.remove_image(tag).await?;
        if !out.success() {
            warn!(tag = %tag, exit_code = out.exit_code, output = %out.text().trim(), "Image removal failed");
        }
        Ok(out.success())
    }

    /// Remove any existing image and build it again.
    pub async fn rebuild(&self, env: &mut Environment) -> ContainerResult<BuildReport> {
        self.remove(&env.tag).await?;
        self.build(env).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{RuntimeCall, ScriptedRuntime};

    #[tokio::test]
    async fn test_build_marks_created() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let builder = EnvironmentBuilder::new(runtime.clone());
        let mut env = Environment::new("python-3.12", "FROM python:3.12-slim\n");

        let report = builder.build(&mut env).await.unwrap();
        assert_eq!(report.status, EnvironmentStatus::Created);
        assert_eq!(env.status, EnvironmentStatus::Created);
        assert!(runtime.images().contains(&"python-3.12".to_string()));
    }

    #[tokio::test]
    async fn test_build_failure_marks_failed() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.fail_build("broken");
        let builder = EnvironmentBuilder::new(runtime.clone());
        let mut env = Environment::new("broken", "FROM nowhere\n");

        let report = builder.build(&mut env).await.unwrap();
        assert_eq!(report.status, EnvironmentStatus::Failed);
        assert_eq!(env.status, EnvironmentStatus::Failed);
        assert_ne!(report.exit_code, 0);
    }

    #[tokio::test]
    async fn test_rebuild_removes_first() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let builder = EnvironmentBuilder::new(runtime.clone());
        let mut env = Environment::new("gcc", "FROM gcc:13\n");
        builder.build(&mut env).await.unwrap();
        builder.rebuild(&mut env).await.unwrap();

        let calls = runtime.calls();
        assert_eq!(
            calls,
            vec![
                RuntimeCall::Build { tag: "gcc".into() },
                RuntimeCall::RemoveImage { tag: "gcc".into() },
                RuntimeCall::Build { tag: "gcc".into() },
            ]
        );
        assert_eq!(env.status, EnvironmentStatus::Created);
    }
}
