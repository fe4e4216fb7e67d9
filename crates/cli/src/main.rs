use std::process::ExitCode;

use clap::Parser;

mod client;
mod commands;

use commands::Command;
use sluice_runtime::{DEFAULT_CONNECT_ADDRESS, logging};

#[derive(Debug, Parser)]
#[command(
    name = "sluice",
    version,
    about = "Client and load generator for the sluice ingestion daemon",
    propagate_version = true
)]
pub struct Cli {
    /// Daemon address
    #[arg(long, global = true, default_value = DEFAULT_CONNECT_ADDRESS)]
    pub addr: String,

    #[command(subcommand)]
    pub command: Command,
}

fn main() -> ExitCode {
    logging::init().ok();

    let cli = Cli::parse();
    let addr = cli.addr.as_str();
    match cli.command {
        Command::Ping => commands::ping(addr),
        Command::Send(args) => commands::send::run(addr, args),
        Command::Stream(args) => commands::stream::run(addr, args),
        Command::Stats(args) => commands::stats::run(addr, args),
        Command::Bench(args) => commands::bench::run(addr, args),
    }
}
