mod cli;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_logging(&cli.log_level)?;
    cli::run(cli)
}
