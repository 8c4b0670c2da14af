//! Pull side of the byte channel.
//!
//! A [`Source`] hands out the archive stream one chunk at a time: `read(max)` returns a non-empty
//! chunk while data remains, and an empty chunk once (and every time after) the stream is
//! exhausted. Destinations loop on `read` until they see that empty chunk. Reader-backed sources
//! never return more than `max` bytes; a local source hands out its chunks exactly as the archiver
//! wrote them, so those may be larger than `max`.

use anyhow::Context;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::instrument;

use crate::container;
use crate::local;
use crate::path;
use crate::stdio;

/// Boxed async reader backing a [`StreamSource`].
pub type BoxedRead = Box<dyn tokio::io::AsyncRead + Unpin + Send>;

/// Deferred check run once the underlying reader hits end-of-file.
pub type Completion = futures::future::BoxFuture<'static, anyhow::Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Streaming,
    Done,
    Failed,
}

/// Source backed by an async reader, e.g. stdin or the stdout of a `docker cp` process.
///
/// Chunks are filled up to the requested size, so a short chunk is only ever returned right
/// before end-of-stream. Once a read fails, every later read fails too.
pub struct StreamSource {
    reader: BoxedRead,
    completion: Option<Completion>,
    state: State,
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource")
            .field("pending_completion", &self.completion.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl StreamSource {
    #[must_use]
    pub fn new(reader: BoxedRead) -> Self {
        Self {
            reader,
            completion: None,
            state: State::Streaming,
        }
    }

    /// Like [`StreamSource::new`], but `completion` is awaited when end-of-file is first reached and
    /// its error, if any, is returned from that read instead of the empty chunk.
    #[must_use]
    pub fn with_completion(reader: BoxedRead, completion: Completion) -> Self {
        Self {
            reader,
            completion: Some(completion),
            state: State::Streaming,
        }
    }

    pub async fn read(&mut self, max: usize) -> anyhow::Result<Bytes> {
        anyhow::ensure!(max > 0, "read size must be at least one byte");
        match self.state {
            State::Streaming => {}
            State::Done => return Ok(Bytes::new()),
            State::Failed => return Err(anyhow::anyhow!("stream already failed")),
        }
        match self.fill(max).await {
            Ok(chunk) => Ok(chunk),
            Err(error) => {
                self.state = State::Failed;
                Err(error)
            }
        }
    }

    async fn fill(&mut self, max: usize) -> anyhow::Result<Bytes> {
        let mut buf = vec![0u8; max];
        let mut filled = 0;
        while filled < max {
            let read = self
                .reader
                .read(&mut buf[filled..])
                .await
                .context("failed reading from stream")?;
            if read == 0 {
                self.finish().await?;
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    async fn finish(&mut self) -> anyhow::Result<()> {
        if let Some(completion) = self.completion.take() {
            completion.await?;
        }
        self.state = State::Done;
        Ok(())
    }
}

/// Every kind of endpoint an archive can be read from.
#[derive(Debug)]
pub enum Source {
    Stdio(StreamSource),
    Container(container::ContainerSource),
    Local(local::LocalSource),
}

impl Source {
    /// Opens the source named by `path`.
    ///
    /// Container lookups happen here and fail early; a local source always opens successfully and
    /// reports archiving problems from [`Source::read`].
    #[instrument(skip(runtime))]
    pub async fn open(
        path: &path::PathType,
        runtime: &dyn container::ContainerRuntime,
        bufsize: usize,
    ) -> anyhow::Result<Self> {
        let source = match path {
            path::PathType::Stdio => Source::Stdio(stdio::stdin()),
            path::PathType::Container(container_path) => Source::Container(
                container::ContainerSource::open(runtime, container_path).await?,
            ),
            path::PathType::Local(local_path) => {
                Source::Local(local::LocalSource::new(local_path, bufsize))
            }
        };
        tracing::debug!("opened source: {}", &source);
        Ok(source)
    }

    /// Reads the next chunk; empty means end-of-stream.
    ///
    /// Stdin and container chunks hold at most `max` bytes. Local chunks are relayed as written by
    /// the archiver and ignore `max`.
    pub async fn read(&mut self, max: usize) -> anyhow::Result<Bytes> {
        match self {
            Source::Stdio(stream) => stream.read(max).await,
            Source::Container(container) => container.read(max).await,
            Source::Local(local) => local.read(max).await,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Stdio(_) => write!(f, "stdin"),
            Source::Container(container) => write!(f, "{container}"),
            Source::Local(local) => write!(f, "{local}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_source(data: &[u8]) -> StreamSource {
        StreamSource::new(Box::new(std::io::Cursor::new(data.to_vec())))
    }

    #[tokio::test]
    async fn chunks_are_full_until_the_end() -> anyhow::Result<()> {
        let mut source = memory_source(b"0123456789");
        assert_eq!(source.read(4).await?, Bytes::from_static(b"0123"));
        assert_eq!(source.read(4).await?, Bytes::from_static(b"4567"));
        assert_eq!(source.read(4).await?, Bytes::from_static(b"89"));
        assert!(source.read(4).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn fills_chunks_across_short_reads() -> anyhow::Result<()> {
        // a duplex pipe hands data over in the pieces it was written in
        let (mut writer, reader) = tokio::io::duplex(3);
        let feeder = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            writer.write_all(b"abcdefgh").await?;
            anyhow::Ok(())
        });
        let mut source = StreamSource::new(Box::new(reader));
        assert_eq!(source.read(6).await?, Bytes::from_static(b"abcdef"));
        feeder.await??;
        assert_eq!(source.read(6).await?, Bytes::from_static(b"gh"));
        assert!(source.read(6).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn end_of_stream_is_sticky() -> anyhow::Result<()> {
        let mut source = memory_source(b"");
        for _ in 0..3 {
            assert!(source.read(16).await?.is_empty());
        }
        Ok(())
    }

    #[tokio::test]
    async fn zero_sized_read_is_rejected() {
        let mut source = memory_source(b"data");
        assert!(source.read(0).await.is_err());
    }

    #[tokio::test]
    async fn completion_runs_once_at_end_of_stream() -> anyhow::Result<()> {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let completion = {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                anyhow::Ok(())
            })
        };
        let mut source =
            StreamSource::with_completion(Box::new(std::io::Cursor::new(b"xy".to_vec())), completion);
        assert_eq!(source.read(8).await?, Bytes::from_static(b"xy"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(source.read(8).await?.is_empty());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn completion_failure_surfaces_at_end_of_stream() {
        let completion = Box::pin(async { Err::<(), _>(anyhow::anyhow!("process exited with 1")) });
        let mut source =
            StreamSource::with_completion(Box::new(std::io::Cursor::new(b"xy".to_vec())), completion);
        assert_eq!(source.read(2).await.unwrap(), Bytes::from_static(b"xy"));
        let error = source.read(2).await.unwrap_err();
        assert!(error.to_string().contains("exited with 1"));
        // a failed download must never look like a clean end-of-stream afterwards
        for _ in 0..2 {
            let error = source.read(2).await.unwrap_err();
            assert!(error.to_string().contains("already failed"));
        }
    }

    struct BrokenReader {
        data: Option<&'static [u8]>,
    }

    impl tokio::io::AsyncRead for BrokenReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match self.data.take() {
                Some(data) => {
                    buf.put_slice(data);
                    std::task::Poll::Ready(Ok(()))
                }
                None => std::task::Poll::Ready(Err(std::io::Error::other("device gone"))),
            }
        }
    }

    #[tokio::test]
    async fn reader_error_is_sticky() {
        let mut source = StreamSource::new(Box::new(BrokenReader {
            data: Some(b"abc"),
        }));
        assert_eq!(source.read(3).await.unwrap(), Bytes::from_static(b"abc"));
        let error = source.read(3).await.unwrap_err();
        assert!(format!("{error:#}").contains("device gone"));
        let error = source.read(3).await.unwrap_err();
        assert!(error.to_string().contains("already failed"));
    }
}
