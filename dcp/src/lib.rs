//! Container copy tool - `dcp`
//!
//! `dcp` copies a file tree between any two of: the process's standard streams, a path inside a
//! running Docker container, and a local path. The tree always travels as a tar archive, so the
//! pieces compose with the usual shell tooling.
//!
//! # Usage
//!
//! ```bash
//! # Container to local directory: ./out/logs is created
//! dcp web1:/app/logs ./out
//!
//! # Local directory into a container
//! dcp ./data web1:/tmp
//!
//! # Archive a local directory to stdout, or extract one from stdin
//! dcp ./data - | gzip > data.tar.gz
//! gunzip < data.tar.gz | dcp - ./restored
//!
//! # Container to container, through a pipe
//! dcp web1:/etc - | dcp - web2:/backup
//! ```
//!
//! # Path syntax
//!
//! Each path is classified in order:
//! - `-` is stdin (as a source) or stdout (as a destination)
//! - `NAME:PATH`, where `NAME` consists of letters, digits, `_` and `-`, is `PATH` inside the
//!   running container `NAME`
//! - anything else is a local path
//!
//! `./web1:/x` is therefore a local path. An empty path inside a container (`web1:`) is rejected,
//! use `web1:/` for the container's root directory.
//!
//! # Archive layout
//!
//! Archives are rooted at the basename of the source path: copying `/srv/data` produces entries
//! `data`, `data/...`. Destinations are directories the archive is extracted into, so copying
//! `/srv/data` into `/backup` yields `/backup/data`. Symlinks are stored as symlinks.
//!
//! # Architecture
//!
//! Every transfer is a pull loop: the destination repeatedly asks the [`source::Source`] for up
//! to `--bufsize` bytes until it hands back an empty chunk.
//!
//! - [`path`] - classifies the command line arguments
//! - [`source`] and [`destination`] - the closed sets of endpoint kinds
//! - [`relay`] - adapts the push-style tar writer to the pull loop through a bounded channel
//! - [`local`] - archiving and extraction of local trees
//! - [`container`] - the container runtime client (the `docker` binary by default)
//! - [`transfer`] - wires everything together
//!
//! Nothing is buffered beyond a few chunks, so trees of any size stream in constant memory.
//!
//! # Logging
//!
//! All diagnostics go to stderr. `-v` echoes the buffer size and both endpoints, `-vv` and `-vvv`
//! add debug and trace output; `RUST_LOG` overrides the level entirely. `-q` silences even error
//! messages, leaving only the exit code.

pub mod container;
pub mod destination;
pub mod local;
pub mod path;
pub mod relay;
pub mod source;
pub mod stdio;
pub mod transfer;

#[cfg(test)]
mod testutils;

pub use transfer::{Settings, transfer};
