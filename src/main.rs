//! Revgate CLI entry point.

use clap::Parser;
use revgate::cli::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = cli::run(cli).await;
    std::process::exit(exit_code);
}
