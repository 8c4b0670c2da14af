//! Running containers as an endpoint.
//!
//! The container runtime does all the archiving on its side: downloading a path yields a ready tar
//! stream and uploading hands a tar stream to the runtime for extraction. Everything goes through
//! the [`ContainerRuntime`] trait so the client can be swapped out; [`DockerCli`] is the
//! implementation backed by the `docker` command line client, which picks up the usual
//! `DOCKER_HOST`/context configuration from the environment.

use anyhow::Context;
use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::instrument;

use crate::destination::{Summary, pump};
use crate::path::ContainerPath;
use crate::source::{Source, StreamSource};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No such container: {container}")]
    NotFound { container: String },
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Client side of a container runtime.
pub trait ContainerRuntime: Send + Sync + std::fmt::Debug {
    /// Opens a tar stream of `target`.
    ///
    /// Fails with [`Error::NotFound`] if the container does not exist.
    fn get_archive<'a>(&'a self, target: &'a ContainerPath)
    -> BoxFuture<'a, anyhow::Result<StreamSource>>;

    /// Extracts the tar stream read from `source` at `target`, draining `source` in chunks of at
    /// most `bufsize` bytes.
    fn put_archive<'a>(
        &'a self,
        target: &'a ContainerPath,
        source: &'a mut Source,
        bufsize: usize,
    ) -> BoxFuture<'a, anyhow::Result<Summary>>;
}

/// [`ContainerRuntime`] driving the `docker` binary.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: std::path::PathBuf,
}

impl DockerCli {
    pub fn new(binary: impl Into<std::path::PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.binary);
        command.kill_on_drop(true);
        command
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary.display(), args.join(" "))
    }

    #[instrument]
    async fn lookup(&self, container: &str) -> anyhow::Result<()> {
        let args = ["container", "inspect", container];
        let output = self
            .command()
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .output()
            .await
            .with_context(|| format!("failed running {:?}", &self.binary))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("No such container") || stderr.contains("No such object") {
            return Err(Error::NotFound {
                container: container.to_string(),
            }
            .into());
        }
        Err(Error::CommandFailed {
            command: self.describe(&args),
            status: output.status,
            stderr,
        }
        .into())
    }

    #[instrument]
    async fn download(&self, target: &ContainerPath) -> anyhow::Result<StreamSource> {
        self.lookup(&target.container).await?;
        let target = target.to_string();
        let args = ["cp", target.as_str(), "-"];
        let mut child = self
            .command()
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("failed running {:?}", &self.binary))?;
        let stdout = child
            .stdout
            .take()
            .context("docker cp stdout was not captured")?;
        let completion = Box::pin(wait_for(child, self.describe(&args)));
        Ok(StreamSource::with_completion(Box::new(stdout), completion))
    }

    #[instrument(skip(source))]
    async fn upload(
        &self,
        target: &ContainerPath,
        source: &mut Source,
        bufsize: usize,
    ) -> anyhow::Result<Summary> {
        self.lookup(&target.container).await?;
        let target = target.to_string();
        let args = ["cp", "-", target.as_str()];
        let mut child = self
            .command()
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("failed running {:?}", &self.binary))?;
        let mut stdin = child
            .stdin
            .take()
            .context("docker cp stdin was not captured")?;
        let pumped = pump(source, &mut stdin, bufsize).await;
        // closing stdin tells docker the archive is complete
        drop(stdin);
        let exited = wait_for(child, self.describe(&args)).await;
        match (pumped, exited) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(exit_error)) => Err(exit_error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(exit_error)) => Err(error.context(format!("{exit_error:#}"))),
        }
    }
}

async fn wait_for(child: tokio::process::Child, command: String) -> anyhow::Result<()> {
    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("failed waiting for `{command}`"))?;
    if output.status.success() {
        tracing::debug!("`{command}` finished");
        return Ok(());
    }
    Err(Error::CommandFailed {
        command,
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
    .into())
}

impl ContainerRuntime for DockerCli {
    fn get_archive<'a>(
        &'a self,
        target: &'a ContainerPath,
    ) -> BoxFuture<'a, anyhow::Result<StreamSource>> {
        Box::pin(self.download(target))
    }

    fn put_archive<'a>(
        &'a self,
        target: &'a ContainerPath,
        source: &'a mut Source,
        bufsize: usize,
    ) -> BoxFuture<'a, anyhow::Result<Summary>> {
        Box::pin(self.upload(target, source, bufsize))
    }
}

/// Tar stream of a path inside a container, archived by the runtime.
#[derive(Debug)]
pub struct ContainerSource {
    target: ContainerPath,
    stream: StreamSource,
}

impl ContainerSource {
    pub async fn open(
        runtime: &dyn ContainerRuntime,
        target: &ContainerPath,
    ) -> anyhow::Result<Self> {
        let stream = runtime.get_archive(target).await?;
        Ok(Self {
            target: target.clone(),
            stream,
        })
    }

    pub async fn read(&mut self, max: usize) -> anyhow::Result<Bytes> {
        self.stream
            .read(max)
            .await
            .with_context(|| format!("failed reading archive of {}", &self.target))
    }
}

impl std::fmt::Display for ContainerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "container path {}", &self.target)
    }
}

/// Directory inside a container the incoming tar stream is extracted into.
#[derive(Debug)]
pub struct ContainerDestination {
    runtime: std::sync::Arc<dyn ContainerRuntime>,
    target: ContainerPath,
    bufsize: usize,
}

impl ContainerDestination {
    #[must_use]
    pub fn new(
        runtime: std::sync::Arc<dyn ContainerRuntime>,
        target: ContainerPath,
        bufsize: usize,
    ) -> Self {
        Self {
            runtime,
            target,
            bufsize,
        }
    }

    /// Hands the whole source to the runtime, which drains it.
    #[instrument(skip(source))]
    pub async fn run(self, source: &mut Source) -> anyhow::Result<Summary> {
        self.runtime
            .put_archive(&self.target, source, self.bufsize)
            .await
    }
}

impl std::fmt::Display for ContainerDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "container path {}", &self.target)
    }
}
