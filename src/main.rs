use clap::Parser;
use stackrouter::cli::{run_cli, Cli};
use stackrouter::logging::init_logging;

fn main() -> anyhow::Result<()> {
    let _guard = init_logging()?;
    run_cli(Cli::parse())
}
