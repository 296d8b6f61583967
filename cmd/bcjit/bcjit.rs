use bcjit_cli::{cli::CLI, initializers::init_tracing};
use clap::Parser;
use tracing::debug;

fn main() -> eyre::Result<()> {
    let CLI { opts, command } = CLI::parse();

    init_tracing(&opts)?;
    debug!(?command, "starting bcjit");

    command.run()
}
