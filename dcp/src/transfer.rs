use tracing::instrument;

use crate::container::ContainerRuntime;
use crate::destination::{Destination, Summary};
use crate::path;
use crate::source::Source;

/// Default chunk size, in bytes, used for every read and write of the archive stream.
pub const DEFAULT_BUFSIZE: usize = 10240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Maximum size of a single chunk read from the source and written to the destination.
    pub bufsize: usize,
}

/// Copies the tree named by `src` to `dst`.
///
/// Both paths are resolved first, so a malformed path fails before anything is opened. The source
/// is opened next (container lookups happen here), then the destination drains it.
#[instrument(skip(runtime))]
pub async fn transfer(
    src: &str,
    dst: &str,
    settings: Settings,
    runtime: std::sync::Arc<dyn ContainerRuntime>,
) -> anyhow::Result<Summary> {
    anyhow::ensure!(
        settings.bufsize > 0,
        "buffer size must be at least one byte"
    );
    tracing::info!("bufsize: {}", settings.bufsize);
    tracing::info!("source: {src}");
    tracing::info!("destination: {dst}");
    let src_path = path::parse_path(src)?;
    let dst_path = path::parse_path(dst)?;
    let mut source = Source::open(&src_path, runtime.as_ref(), settings.bufsize).await?;
    let destination = Destination::create(&dst_path, runtime, settings.bufsize);
    tracing::debug!("transferring from {source} to {destination}");
    let summary = destination.run(&mut source).await?;
    tracing::info!("transfer done, {} bytes", summary.bytes);
    Ok(summary)
}
