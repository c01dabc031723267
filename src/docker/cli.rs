use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use super::{ContainerRuntime, ContainerSpec, ContainerState, ExecOutput, RuntimeError, SessionStream};

/// Short runtime calls (inspect, start, stop) use this ceiling.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives the Docker Engine through the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: String,
}

impl DockerCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn describe(&self, args: &[String]) -> String {
        let mut rendered = self.bin.clone();
        for arg in args.iter().take(3) {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }

    /// Runs the client to completion. The child is killed if the timeout
    /// elapses first.
    async fn run(&self, args: &[String], timeout: Duration) -> Result<ExecOutput, RuntimeError> {
        let command_desc = self.describe(args);
        debug!(command = %command_desc, "Running docker command.");

        let mut command = TokioCommand::new(&self.bin);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| RuntimeError::Spawn {
            program: self.bin.clone(),
            source: e,
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| RuntimeError::Spawn {
                program: self.bin.clone(),
                source: e,
            })?,
            Err(_) => {
                warn!(command = %command_desc, secs = timeout.as_secs(), "Docker command timed out, killing it.");
                return Err(RuntimeError::Timeout {
                    command: command_desc,
                    secs: timeout.as_secs(),
                });
            }
        };

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Like [`run`](Self::run) but maps a non-zero exit to an error, and
    /// "no such ..." answers to [`RuntimeError::NotFound`].
    async fn run_checked(
        &self,
        args: &[String],
        timeout: Duration,
        subject: &str,
    ) -> Result<ExecOutput, RuntimeError> {
        let output = self.run(args, timeout).await?;
        if output.success() {
            return Ok(output);
        }
        if is_missing_object(&output.stderr) {
            return Err(RuntimeError::NotFound(subject.to_string()));
        }
        Err(RuntimeError::CommandFailed {
            command: self.describe(args),
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

fn is_missing_object(stderr: &str) -> bool {
    let lowered = stderr.to_ascii_lowercase();
    lowered.contains("no such container")
        || lowered.contains("no such object")
        || lowered.contains("no such network")
        || (lowered.contains("network") && lowered.contains("not found"))
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn network_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        match self
            .run_checked(&args(["network", "inspect", name]), CONTROL_TIMEOUT, name)
            .await
        {
            Ok(_) => Ok(true),
            Err(RuntimeError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.run_checked(
            &args(["network", "create", "--driver", "bridge", name]),
            CONTROL_TIMEOUT,
            name,
        )
        .await?;
        info!(network = %name, "Created docker network.");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        // Pulling the image may take a while on a fresh host.
        let output = self
            .run_checked(&spec.to_run_args(), Duration::from_secs(600), &spec.image)
            .await?;
        let container_id = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .ok_or_else(|| RuntimeError::Parse("docker run printed no container id".to_string()))?
            .to_string();
        info!(container_id = %container_id, name = %spec.name, "Container created.");
        Ok(container_id)
    }

    async fn start(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.run_checked(&args(["start", container_id]), CONTROL_TIMEOUT, container_id)
            .await
            .map(|_| ())
    }

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.run_checked(&args(["stop", container_id]), CONTROL_TIMEOUT, container_id)
            .await
            .map(|_| ())
    }

    async fn restart(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.run_checked(&args(["restart", container_id]), CONTROL_TIMEOUT, container_id)
            .await
            .map(|_| ())
    }

    async fn remove(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.run_checked(&args(["rm", "-f", container_id]), CONTROL_TIMEOUT, container_id)
            .await
            .map(|_| ())
    }

    async fn state(&self, container_id: &str) -> Result<ContainerState, RuntimeError> {
        let output = self
            .run_checked(
                &args(["inspect", "--format", "{{.State.Status}}", container_id]),
                CONTROL_TIMEOUT,
                container_id,
            )
            .await?;
        Ok(ContainerState::parse(&output.stdout))
    }

    async fn exec(
        &self,
        container_id: &str,
        command: &[String],
        timeout: Duration,
    ) -> Result<ExecOutput, RuntimeError> {
        let mut full = args(["exec", container_id]);
        full.extend(command.iter().cloned());
        let output = self.run(&full, timeout).await?;
        if !output.success() && is_missing_object(&output.stderr) {
            return Err(RuntimeError::NotFound(container_id.to_string()));
        }
        Ok(output)
    }

    async fn spawn_session(
        &self,
        container_id: &str,
        command: &[String],
    ) -> Result<SessionStream, RuntimeError> {
        let mut full = args(["exec", container_id]);
        full.extend(command.iter().cloned());

        let mut child = TokioCommand::new(&self.bin)
            .args(&full)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RuntimeError::Spawn {
                program: self.bin.clone(),
                source: e,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Parse("session process has no stdout".to_string()))?;

        info!(pid = ?child.id(), container_id = %container_id, "Spawned terminal session process.");

        // The session must outlive this call; a detached task reaps it.
        let container = container_id.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(container_id = %container, ?status, "Terminal session process exited."),
                Err(e) => warn!(container_id = %container, error = %e, "Failed to wait for terminal session process."),
            }
        });

        Ok(Box::new(BufReader::new(stdout)))
    }

    async fn server_version(&self) -> Result<String, RuntimeError> {
        let output = self
            .run_checked(
                &args(["version", "--format", "{{.Server.Version}}"]),
                CONTROL_TIMEOUT,
                "docker server",
            )
            .await?;
        Ok(output.stdout.trim().to_string())
    }
}
