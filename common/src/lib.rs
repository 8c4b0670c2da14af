//! Shared plumbing for the `dcp` tool: runtime construction, logging setup and error reporting.
//!
//! Binaries describe what they want through [`OutputConfig`] and [`RuntimeConfig`] and hand their
//! async entry point to [`run`]. Everything diagnostic goes to stderr: stdout is reserved for data
//! because `dcp` can stream a tar archive there.

use std::io::IsTerminal;

pub mod config;

pub use config::{OutputConfig, RuntimeConfig};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the level is derived from the verbosity in `output`.
pub fn init_tracing(output: &OutputConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(output.log_directive()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed installing tracing subscriber: {err}"))?;
    Ok(())
}

fn report_error(output: &OutputConfig, error: &anyhow::Error) {
    if !output.quiet {
        eprintln!("{error:#}");
    }
}

/// Runs `func` to completion on a freshly built tokio runtime.
///
/// Returns `None` if anything failed; the error has already been reported to stderr (unless
/// `quiet` is set), so callers only need to pick an exit code.
pub fn run<Fut, Summary>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    // a subscriber installed earlier (e.g. by an embedding test) is not fatal
    if let Err(error) = init_tracing(&output) {
        report_error(&output, &error);
    }
    let runtime = match runtime.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            report_error(&output, &anyhow::Error::from(error).context("failed building runtime"));
            return None;
        }
    };
    match runtime.block_on(func()) {
        Ok(summary) => {
            if output.print_summary {
                eprintln!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::debug!("operation failed: {:?}", &error);
            report_error(&output, &error);
            None
        }
    }
}
