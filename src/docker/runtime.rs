//! Container runtime seam.
//!
//! The supervisor talks to the runtime through this trait; production uses
//! the `docker` CLI via subprocesses, tests substitute a scripted fake.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a fresh container with the given name from `image`.
    async fn run(&self, name: &str, image: &str) -> anyhow::Result<()>;

    /// Whether the named container's main process is currently running.
    async fn is_running(&self, name: &str) -> anyhow::Result<bool>;

    /// Start a stopped container.
    async fn start(&self, name: &str) -> anyhow::Result<()>;

    /// Run `script` inside the container with `/bin/sh`, streaming stdout and
    /// stderr into one buffer, and resolve with the accumulated output when
    /// the streams end.
    async fn exec_script(
        &self,
        name: &str,
        script: &str,
        timeout: Option<Duration>,
    ) -> anyhow::Result<String>;

    async fn stop(&self, name: &str) -> anyhow::Result<()>;

    async fn remove(&self, name: &str) -> anyhow::Result<()>;
}

/// Drives the local `docker` CLI.
pub struct DockerCli {
    socket_path: Option<String>,
}

impl DockerCli {
    pub fn new(socket_path: Option<String>) -> Self {
        Self { socket_path }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("docker");
        if let Some(socket) = &self.socket_path {
            cmd.env("DOCKER_HOST", socket);
        }
        cmd
    }

    async fn checked(&self, args: &[&str]) -> anyhow::Result<String> {
        let output = self.command().args(args).output().await?;
        if !output.status.success() {
            anyhow::bail!(
                "docker {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn run(&self, name: &str, image: &str) -> anyhow::Result<()> {
        debug!(name, image, "docker run");
        // Keep the container alive so scripts can be exec'd into it later.
        self.checked(&["run", "-d", "--name", name, image, "tail", "-f", "/dev/null"])
            .await?;
        Ok(())
    }

    async fn is_running(&self, name: &str) -> anyhow::Result<bool> {
        let state = self
            .checked(&["inspect", "-f", "{{.State.Running}}", name])
            .await?;
        Ok(state == "true")
    }

    async fn start(&self, name: &str) -> anyhow::Result<()> {
        self.checked(&["start", name]).await?;
        Ok(())
    }

    async fn exec_script(
        &self,
        name: &str,
        script: &str,
        timeout: Option<Duration>,
    ) -> anyhow::Result<String> {
        debug!(name, script_len = script.len(), "docker exec");
        let mut child = self
            .command()
            .args(["exec", name, "/bin/sh", "-c", script])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout = child.stdout.take().expect("stdout piped");
        let mut stderr = child.stderr.take().expect("stderr piped");

        let stream = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (read_out, read_err) = tokio::join!(
                stdout.read_to_end(&mut out),
                stderr.read_to_end(&mut err)
            );
            read_out?;
            read_err?;
            child.wait().await?;
            let mut buffer = String::from_utf8_lossy(&out).into_owned();
            buffer.push_str(&String::from_utf8_lossy(&err));
            anyhow::Ok(buffer)
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, stream)
                .await
                .map_err(|_| anyhow::anyhow!("script timed out after {:?}", limit))?,
            None => stream.await,
        }
    }

    async fn stop(&self, name: &str) -> anyhow::Result<()> {
        self.checked(&["stop", name]).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.checked(&["rm", name]).await?;
        Ok(())
    }
}
