//! cacheforge command-line entry point.

use anyhow::Result;
use cacheforge_search::cli::{run_cli, Cli};
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();
    run_cli(cli)
}
