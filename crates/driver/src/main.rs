//! swarmv command-line entry point

use clap::Parser;
use tracing_subscriber::EnvFilter;

use swarmv::cli::CliOpts;

fn main() {
    let opts = CliOpts::parse();

    let default_level = if opts.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = swarmv::run(opts);
    std::process::exit(code);
}
