//! Boundary to the container runtime.
//!
//! Everything the orchestrator asks of Docker goes through [`ContainerRuntime`],
//! so the provisioning sequence can be exercised against an in-memory fake.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncBufRead;

pub mod cli;
pub mod spec;

pub use cli::DockerCli;
pub use spec::{BindMount, ContainerSpec};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },
    #[error("`{command}` failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Resource busy: {0}")]
    Busy(String),
    #[error("Unexpected runtime output: {0}")]
    Parse(String),
}

impl RuntimeError {
    /// Transport-level failures that may succeed when tried again. A non-zero
    /// exit or a missing container is a terminal answer from the runtime.
    pub fn is_retryable(&self) -> bool {
        match self {
            RuntimeError::Timeout { .. } | RuntimeError::Busy(_) => true,
            RuntimeError::Spawn { source, .. } => matches!(
                source.kind(),
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
            ),
            RuntimeError::CommandFailed { .. }
            | RuntimeError::NotFound(_)
            | RuntimeError::Parse(_) => false,
        }
    }
}

/// Container state as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Other(String),
}

impl ContainerState {
    pub fn parse(status: &str) -> Self {
        match status.trim() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            other => ContainerState::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running | ContainerState::Restarting)
    }
}

/// Captured result of a command run inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Line-oriented stdout of a long-lived process started inside a container.
pub type SessionStream = Box<dyn AsyncBufRead + Send + Unpin>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn network_exists(&self, name: &str) -> Result<bool, RuntimeError>;

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError>;

    /// Creates and starts a detached container, returning its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start(&self, container_id: &str) -> Result<(), RuntimeError>;

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError>;

    async fn restart(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Force-removes the container.
    async fn remove(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Fails with [`RuntimeError::NotFound`] when the container does not exist.
    async fn state(&self, container_id: &str) -> Result<ContainerState, RuntimeError>;

    /// Runs a command to completion. A non-zero exit is reported in the
    /// returned output, not as an error.
    async fn exec(
        &self,
        container_id: &str,
        command: &[String],
        timeout: Duration,
    ) -> Result<ExecOutput, RuntimeError>;

    /// Starts a command that keeps running after this call returns and hands
    /// back its stdout.
    async fn spawn_session(
        &self,
        container_id: &str,
        command: &[String],
    ) -> Result<SessionStream, RuntimeError>;

    async fn server_version(&self) -> Result<String, RuntimeError>;
}

/// Builds an argv for `bash -c <script>`.
pub fn shell(script: impl Into<String>) -> Vec<String> {
    vec!["bash".to_string(), "-c".to_string(), script.into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(
            RuntimeError::Timeout {
                command: "docker exec".to_string(),
                secs: 5
            }
            .is_retryable()
        );
        assert!(RuntimeError::Busy("dpkg lock".to_string()).is_retryable());
        assert!(!RuntimeError::NotFound("abc".to_string()).is_retryable());
        assert!(
            !RuntimeError::CommandFailed {
                command: "apt-get".to_string(),
                code: 100,
                stderr: String::new()
            }
            .is_retryable()
        );
        assert!(
            !RuntimeError::Spawn {
                program: "docker".to_string(),
                source: std::io::Error::from(ErrorKind::NotFound),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_container_state_parse() {
        assert!(ContainerState::parse("running\n").is_running());
        assert_eq!(ContainerState::parse("exited"), ContainerState::Exited);
        assert!(!ContainerState::parse("exited").is_running());
        assert_eq!(
            ContainerState::parse("removing"),
            ContainerState::Other("removing".to_string())
        );
    }
}
