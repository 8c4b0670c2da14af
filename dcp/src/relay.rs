//! Push-to-pull bridge between a blocking producer and an async reader.
//!
//! Archivers such as [`tar::Builder`] want to *own* a [`std::io::Write`] sink and push bytes into
//! it at their own pace, while every destination in this crate *pulls* chunks from a source. A
//! [`Relay`] reconciles the two: the producer runs on a blocking worker and writes into a
//! [`RelayWriter`]; each write is forwarded verbatim, in order, over a bounded channel, and the
//! foreground side receives them one at a time with [`Relay::read`].
//!
//! The channel carries a tagged [`Chunk`]. Exactly one terminal item ([`Chunk::Done`] or
//! [`Chunk::Failed`]) is sent per worker, after all of its data. The worker is joined before a
//! terminal item is handed to the caller, so it never outlives the read that observed the end.
//!
//! [`ChunkReader`] is the mirror image: it lets a blocking consumer (e.g. [`tar::Archive`]) pull
//! bytes that an async task feeds into a channel.
//!
//! Workers are plain OS threads rather than tokio's blocking pool. The pool is shared with stdio
//! and can be capped by `--max-blocking-threads`; a producer parked on a full channel there could
//! starve the very task that drains it.

use anyhow::{Context, anyhow};
use bytes::Bytes;

/// Number of in-flight chunks between the worker and the reader.
pub const RELAY_CAPACITY: usize = 16;

/// One item on the relay channel.
#[derive(Debug)]
pub enum Chunk {
    Data(Bytes),
    Done,
    Failed(anyhow::Error),
}

/// The [`std::io::Write`] end handed to the producer.
#[derive(Debug)]
pub struct RelayWriter {
    sender: async_channel::Sender<Chunk>,
}

impl std::io::Write for RelayWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        // an empty data chunk would read as end-of-stream on the other side
        if buf.is_empty() {
            return Ok(0);
        }
        self.sender
            .send_blocking(Chunk::Data(Bytes::copy_from_slice(buf)))
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "relay reader is gone, no one left to receive data",
                )
            })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Blocking closure running on a dedicated OS thread, joined asynchronously.
#[derive(Debug)]
pub struct Worker<T> {
    result: tokio::sync::oneshot::Receiver<anyhow::Result<T>>,
    spawn_error: Option<std::io::Error>,
}

impl<T: Send + 'static> Worker<T> {
    /// Starts `work` on a new thread called `name`. Spawn failures are reported by
    /// [`Worker::join`].
    pub fn spawn<F>(name: &str, work: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let (sender, result) = tokio::sync::oneshot::channel();
        let spawned = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(work))
                    .unwrap_or_else(|payload| {
                        Err(anyhow!("worker panicked: {}", panic_message(payload.as_ref())))
                    });
                if sender.send(outcome).is_err() {
                    tracing::debug!("worker finished after its owner went away");
                }
            });
        Self {
            result,
            spawn_error: spawned.err(),
        }
    }

    /// Waits for the thread to finish and returns what the closure returned.
    pub async fn join(self) -> anyhow::Result<T> {
        if let Some(error) = self.spawn_error {
            return Err(error).context("failed spawning worker thread");
        }
        self.result
            .await
            .context("worker thread exited without reporting a result")?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Streaming,
    Done,
    Failed,
}

/// Reading side of a running producer.
#[derive(Debug)]
pub struct Relay {
    receiver: async_channel::Receiver<Chunk>,
    worker: Option<Worker<()>>,
    state: State,
}

impl Relay {
    /// Starts `producer` on a dedicated worker thread and returns the reading side immediately.
    ///
    /// Construction never fails; producer errors are delivered by [`Relay::read`].
    pub fn spawn<F>(capacity: usize, producer: F) -> Self
    where
        F: FnOnce(&mut RelayWriter) -> anyhow::Result<()> + Send + 'static,
    {
        let (sender, receiver) = async_channel::bounded(capacity.max(1));
        let worker = Worker::spawn("dcp-relay", move || {
            let mut writer = RelayWriter {
                sender: sender.clone(),
            };
            let terminal = match producer(&mut writer) {
                Ok(()) => Chunk::Done,
                Err(error) => Chunk::Failed(error),
            };
            drop(writer);
            if sender.send_blocking(terminal).is_err() {
                tracing::debug!("relay reader dropped before the producer finished");
            }
            Ok(())
        });
        Self {
            receiver,
            worker: Some(worker),
            state: State::Streaming,
        }
    }

    /// Returns the next chunk exactly as the producer wrote it.
    ///
    /// An empty chunk means the producer finished successfully; it is returned again on every
    /// subsequent call. A producer failure is returned once, after which reads keep failing.
    pub async fn read(&mut self) -> anyhow::Result<Bytes> {
        match self.state {
            State::Streaming => {}
            State::Done => return Ok(Bytes::new()),
            State::Failed => return Err(anyhow!("relay producer already failed")),
        }
        match self.receiver.recv().await {
            Ok(Chunk::Data(bytes)) => {
                tracing::trace!("relayed {} bytes", bytes.len());
                Ok(bytes)
            }
            Ok(Chunk::Done) => {
                self.join(State::Done).await?;
                Ok(Bytes::new())
            }
            Ok(Chunk::Failed(error)) => {
                self.join(State::Failed).await?;
                Err(error)
            }
            Err(_) => {
                // only reachable when the worker died without sending its terminal item
                self.join(State::Failed).await?;
                Err(anyhow!("relay producer exited without signaling completion"))
            }
        }
    }

    async fn join(&mut self, state: State) -> anyhow::Result<()> {
        self.state = state;
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        if let Err(error) = worker.join().await {
            self.state = State::Failed;
            return Err(error).context("relay producer did not finish");
        }
        Ok(())
    }

    /// True once the worker has been joined.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.worker.is_none()
    }
}

/// Blocking [`std::io::Read`] over chunks received from a channel.
///
/// Reports end-of-file once every sender is dropped and all queued chunks are consumed.
#[derive(Debug)]
pub struct ChunkReader {
    receiver: async_channel::Receiver<Bytes>,
    current: Bytes,
}

impl ChunkReader {
    #[must_use]
    pub fn new(receiver: async_channel::Receiver<Bytes>) -> Self {
        Self {
            receiver,
            current: Bytes::new(),
        }
    }
}

impl std::io::Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            match self.receiver.recv_blocking() {
                Ok(chunk) => self.current = chunk,
                Err(_) => return Ok(0),
            }
        }
        let len = buf.len().min(self.current.len());
        buf[..len].copy_from_slice(&self.current.split_to(len));
        Ok(len)
    }
}
