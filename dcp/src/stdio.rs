//! The process's standard streams as an endpoint: raw archive bytes in, raw archive bytes out.

use tracing::instrument;

use crate::destination::{Summary, pump};
use crate::source::{Source, StreamSource};

/// Source reading the archive from stdin, untouched.
#[must_use]
pub fn stdin() -> StreamSource {
    StreamSource::new(Box::new(tokio::io::stdin()))
}

/// Destination writing the archive to stdout, untouched.
#[derive(Debug)]
pub struct StdoutDestination {
    bufsize: usize,
}

impl StdoutDestination {
    #[must_use]
    pub fn new(bufsize: usize) -> Self {
        Self { bufsize }
    }

    #[instrument(skip(source))]
    pub async fn run(self, source: &mut Source) -> anyhow::Result<Summary> {
        pump(source, &mut tokio::io::stdout(), self.bufsize).await
    }
}
