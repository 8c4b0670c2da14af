//! Consuming side of the byte channel.
//!
//! A [`Destination`] is handed a [`Source`] exactly once and drains it: it reads chunks of at most
//! its configured buffer size until the first empty chunk, and never reads past it.

use tokio::io::AsyncWriteExt;
use tracing::instrument;

use crate::container;
use crate::local;
use crate::path;
use crate::source::Source;
use crate::stdio;

/// What a destination pulled out of its source.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes: u64,
    pub chunks: usize,
}

impl Summary {
    pub fn record(&mut self, chunk: &[u8]) {
        self.bytes += chunk.len() as u64;
        self.chunks += 1;
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes transferred: {}\n\
            chunks transferred: {}",
            bytesize::ByteSize(self.bytes),
            self.chunks,
        )
    }
}

/// Copies `source` into `writer` verbatim, reading at most `bufsize` bytes at a time.
#[instrument(level = "debug", skip(source, writer))]
pub async fn pump<W: tokio::io::AsyncWrite + Unpin>(
    source: &mut Source,
    writer: &mut W,
    bufsize: usize,
) -> anyhow::Result<Summary> {
    let mut summary = Summary::default();
    loop {
        let chunk = source.read(bufsize).await?;
        if chunk.is_empty() {
            break;
        }
        writer.write_all(&chunk).await?;
        summary.record(&chunk);
    }
    writer.flush().await?;
    tracing::debug!("pumped {} bytes in {} chunks", summary.bytes, summary.chunks);
    Ok(summary)
}

/// Every kind of endpoint an archive can be written to.
#[derive(Debug)]
pub enum Destination {
    Stdio(stdio::StdoutDestination),
    Container(container::ContainerDestination),
    Local(local::LocalDestination),
}

impl Destination {
    /// Creates the destination named by `path`; nothing is touched until [`Destination::run`].
    #[must_use]
    pub fn create(
        path: &path::PathType,
        runtime: std::sync::Arc<dyn container::ContainerRuntime>,
        bufsize: usize,
    ) -> Self {
        match path {
            path::PathType::Stdio => Destination::Stdio(stdio::StdoutDestination::new(bufsize)),
            path::PathType::Container(container_path) => Destination::Container(
                container::ContainerDestination::new(runtime, container_path.clone(), bufsize),
            ),
            path::PathType::Local(local_path) => {
                Destination::Local(local::LocalDestination::new(local_path, bufsize))
            }
        }
    }

    /// Drains `source` into this destination.
    #[instrument(skip_all, fields(destination = %self))]
    pub async fn run(self, source: &mut Source) -> anyhow::Result<Summary> {
        match self {
            Destination::Stdio(stdout) => stdout.run(source).await,
            Destination::Container(container) => container.run(source).await,
            Destination::Local(local) => local.run(source).await,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Stdio(_) => write!(f, "stdout"),
            Destination::Container(container) => write!(f, "{container}"),
            Destination::Local(local) => write!(f, "{local}"),
        }
    }
}
