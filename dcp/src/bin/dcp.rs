use clap::Parser;
use tracing::instrument;

use dcp_tools_dcp::container::DockerCli;
use dcp_tools_dcp::transfer;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dcp",
    version,
    about = "Copy file trees between running Docker containers, local paths and stdio",
    long_about = "`dcp` copies a file tree from SOURCE to DESTINATION, streaming it as a tar archive.

Each path is one of:
    -            stdin (as SOURCE) or stdout (as DESTINATION), carrying a raw tar archive
    NAME:PATH    PATH inside the running container NAME
    PATH         a local path

The archive is rooted at the basename of SOURCE and DESTINATION is the directory it is extracted into.

EXAMPLES:
    # Copy a directory out of a container, creating ./out/logs
    dcp web1:/app/logs ./out

    # Copy a local directory into a container
    dcp ./data web1:/tmp

    # Copy between two containers
    dcp web1:/etc - | dcp - web2:/backup"
)]
struct Args {
    /// Size of the chunks the archive is read and written in
    #[arg(
        short = 'B',
        long,
        default_value_t = bytesize::ByteSize::b(transfer::DEFAULT_BUFSIZE as u64),
        value_name = "SIZE",
        help_heading = "Transfer options"
    )]
    bufsize: bytesize::ByteSize,

    /// Docker client binary used to reach containers
    #[arg(
        long,
        default_value = "docker",
        value_name = "PATH",
        help_heading = "Transfer options"
    )]
    docker_binary: std::path::PathBuf,

    /// Verbose level (implies summary): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Output")]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Output")]
    quiet: bool,

    /// Number of worker threads (0 = number of CPU cores)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads (0 = Tokio default of 512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    /// Where to copy from: `-`, `NAME:PATH` or a local path
    #[arg()]
    source: String,

    /// Where to copy to: `-`, `NAME:PATH` or a local directory
    #[arg()]
    destination: String,
}

#[instrument]
async fn async_main(args: Args) -> anyhow::Result<dcp_tools_dcp::destination::Summary> {
    let bufsize = usize::try_from(args.bufsize.as_u64())?;
    let runtime = std::sync::Arc::new(DockerCli::new(&args.docker_binary));
    transfer::transfer(
        &args.source,
        &args.destination,
        transfer::Settings { bufsize },
        runtime,
    )
    .await
}

fn main() {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.verbose > 0,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let res = common::run(output, runtime, func);
    if res.is_none() {
        std::process::exit(1);
    }
}
