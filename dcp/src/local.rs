//! Local filesystem endpoint.
//!
//! As a source it packs a file or directory tree into a tar stream. The tar builder insists on
//! pushing into a writer it owns, so it runs on a [`Relay`] worker and the chunks it writes are
//! handed out by [`LocalSource::read`]. As a destination it unpacks an incoming tar stream into a
//! directory; the (blocking) decoder runs on its own [`Worker`] thread and pulls its bytes
//! through a [`ChunkReader`] that the foreground task keeps fed from the source.

use std::io::Write;

use anyhow::{Context, anyhow};
use bytes::Bytes;
use tracing::instrument;

use crate::destination::Summary;
use crate::relay::{ChunkReader, RELAY_CAPACITY, Relay, RelayWriter, Worker};
use crate::source::Source;

/// Name the tree is stored under inside the archive: the last component of `path`.
fn archive_name(path: &std::path::Path) -> std::path::PathBuf {
    match path.file_name() {
        Some(name) => std::path::PathBuf::from(name),
        None => std::path::PathBuf::from("."),
    }
}

fn write_archive(
    path: &std::path::Path,
    bufsize: usize,
    sink: &mut RelayWriter,
) -> anyhow::Result<()> {
    let name = archive_name(path);
    let metadata = std::fs::symlink_metadata(path)
        .with_context(|| format!("failed reading metadata from {:?}", &path))?;
    let mut builder = tar::Builder::new(std::io::BufWriter::with_capacity(bufsize, sink));
    builder.follow_symlinks(false);
    if metadata.is_dir() {
        tracing::debug!("archiving directory {:?} as {:?}", &path, &name);
        builder
            .append_dir_all(&name, path)
            .with_context(|| format!("failed archiving directory {:?}", &path))?;
    } else {
        tracing::debug!("archiving {:?} as {:?}", &path, &name);
        builder
            .append_path_with_name(path, &name)
            .with_context(|| format!("failed archiving {:?}", &path))?;
    }
    let mut writer = builder
        .into_inner()
        .context("failed writing end of archive")?;
    writer.flush().context("failed flushing archive")?;
    Ok(())
}

/// Tar stream of a local file or directory, produced in the background.
#[derive(Debug)]
pub struct LocalSource {
    path: std::path::PathBuf,
    relay: Relay,
}

impl LocalSource {
    /// Starts archiving `path` right away; problems with the path are reported by
    /// [`LocalSource::read`], not here.
    #[must_use]
    pub fn new(path: &std::path::Path, bufsize: usize) -> Self {
        let path = path.to_path_buf();
        let relay = Relay::spawn(RELAY_CAPACITY, {
            let path = path.clone();
            move |sink| write_archive(&path, bufsize, sink)
        });
        Self { path, relay }
    }

    /// Returns the next chunk exactly as the archiver wrote it; `max` is not used since the
    /// archiver already decided the chunk size.
    pub async fn read(&mut self, _max: usize) -> anyhow::Result<Bytes> {
        self.relay
            .read()
            .await
            .with_context(|| format!("failed creating archive of {:?}", &self.path))
    }
}

impl std::fmt::Display for LocalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "local path {:?}", &self.path)
    }
}

fn unpack_entry<R: std::io::Read>(
    entry: &mut tar::Entry<'_, R>,
    dst: &std::path::Path,
) -> anyhow::Result<()> {
    let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
    tracing::trace!("extracting {:?}", &name);
    let unpacked = entry
        .unpack_in(dst)
        .with_context(|| format!("failed extracting {:?} into {:?}", &name, &dst))?;
    if !unpacked {
        return Err(anyhow!(
            "refusing to extract {:?}: it would land outside of {:?}",
            &name,
            &dst
        ));
    }
    Ok(())
}

/// Unpacks every entry of the tar stream in `reader` under `dst` and returns the reader, positioned
/// right after the end-of-archive marker.
fn unpack<R: std::io::Read>(reader: R, dst: &std::path::Path) -> anyhow::Result<R> {
    std::fs::create_dir_all(dst).with_context(|| format!("failed creating {:?}", &dst))?;
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);
    {
        // directories go last (deepest first) so read-only modes don't block their contents
        let mut directories = Vec::new();
        for entry in archive.entries().context("failed reading archive")? {
            let mut entry = entry.context("failed reading archive entry")?;
            if entry.header().entry_type() == tar::EntryType::Directory {
                directories.push(entry);
                continue;
            }
            unpack_entry(&mut entry, dst)?;
        }
        directories.sort_by(|a, b| b.path_bytes().cmp(&a.path_bytes()));
        for mut directory in directories {
            unpack_entry(&mut directory, dst)?;
        }
    }
    Ok(archive.into_inner())
}

/// Directory the incoming tar stream is extracted into.
#[derive(Debug)]
pub struct LocalDestination {
    path: std::path::PathBuf,
    bufsize: usize,
}

impl LocalDestination {
    #[must_use]
    pub fn new(path: &std::path::Path, bufsize: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            bufsize,
        }
    }

    #[instrument(skip(source))]
    pub async fn run(self, source: &mut Source) -> anyhow::Result<Summary> {
        let (sender, receiver) = async_channel::bounded::<Bytes>(RELAY_CAPACITY);
        let extractor = {
            let dst = self.path.clone();
            Worker::spawn("dcp-extract", move || {
                let mut rest = unpack(ChunkReader::new(receiver), &dst)?;
                // consume the record padding after the end-of-archive marker
                std::io::copy(&mut rest, &mut std::io::sink())
                    .context("failed reading past end of archive")?;
                Ok(())
            })
        };
        let mut summary = Summary::default();
        let fed = async {
            loop {
                let chunk = source.read(self.bufsize).await?;
                if chunk.is_empty() {
                    return anyhow::Ok(());
                }
                summary.record(&chunk);
                if sender.send(chunk).await.is_err() {
                    tracing::debug!("extractor stopped accepting data");
                    return Ok(());
                }
            }
        }
        .await;
        // closing the channel lets the extractor see end-of-file
        drop(sender);
        let extracted = extractor.join().await;
        // a failing source explains a truncated archive better than the decoder does
        fed?;
        extracted.with_context(|| format!("failed extracting archive into {:?}", &self.path))?;
        tracing::debug!("extracted {} bytes into {:?}", summary.bytes, &self.path);
        Ok(summary)
    }
}

impl std::fmt::Display for LocalDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "local directory {:?}", &self.path)
    }
}
