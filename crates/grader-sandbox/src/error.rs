//! Error types for the sandbox layer.

/// Failures talking to the container runtime itself (as opposed to
/// non-zero exit codes, which are data).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Container lifecycle violations and runtime failures.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container {name} already running")]
    AlreadyRunning { name: String },

    #[error("container {name} is not running")]
    NotRunning { name: String },

    #[error("cannot remove running container {name}")]
    StillRunning { name: String },

    #[error("container {name} failed to start (exit code {exit_code}): {message}")]
    StartFailed {
        name: String,
        exit_code: i32,
        message: String,
    },

    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Result type for runtime calls.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Result type for session operations.
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_error_messages() {
        let err = ContainerError::AlreadyRunning {
            name: "7_gcc".into(),
        };
        assert_eq!(err.to_string(), "container 7_gcc already running");

        let err = ContainerError::StillRunning {
            name: "7_gcc".into(),
        };
        assert!(err.to_string().contains("cannot remove running"));
    }

    #[test]
    fn test_runtime_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "docker");
        let err: ContainerError = RuntimeError::from(io).into();
        assert!(matches!(err, ContainerError::Runtime(RuntimeError::Io(_))));
    }
}
