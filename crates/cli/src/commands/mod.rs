pub mod bench;
pub mod send;
pub mod stats;
pub mod stream;

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;
use log::error;
pub use bench::BenchArgs;
pub use send::SendArgs;
pub use stats::StatsArgs;
pub use stream::StreamArgs;

use crate::client::Client;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the daemon answers.
    Ping,

    /// Submit a single payload.
    ///
    /// Example:
    ///   sluice send 'order:42'
    Send(SendArgs),

    /// Stream payloads from stdin, one per line, and print the final ack.
    ///
    /// Example:
    ///   seq 1 1000 | sluice stream
    Stream(StreamArgs),

    /// Show queue depth, shutdown phase and progress counters.
    Stats(StatsArgs),

    /// Generate load against the daemon.
    ///
    /// Example:
    ///   sluice bench --total 1000000 --concurrency 100
    ///   sluice bench --total 50000 --stream
    Bench(BenchArgs),
}

/// Map a command result to the process exit code, reporting errors the same
/// way for every command.
pub fn finish(name: &str, result: Result<ExitCode>) -> ExitCode {
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("[{name}] {e:#}");
            eprintln!("[{name}] {e:#}");
            ExitCode::from(2)
        }
    }
}

pub fn ping(addr: &str) -> ExitCode {
    finish(
        "ping",
        Client::connect(addr).and_then(|mut client| {
            client.ping()?;
            println!("pong from {addr}");
            Ok(ExitCode::SUCCESS)
        }),
    )
}
