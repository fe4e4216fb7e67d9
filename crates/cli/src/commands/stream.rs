use std::io::{self, BufRead};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use super::finish;
use crate::client::Client;

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Skip empty input lines instead of sending them
    #[arg(long)]
    pub skip_empty: bool,
}

pub fn run(addr: &str, args: StreamArgs) -> ExitCode {
    finish("stream", execute(addr, args))
}

fn execute(addr: &str, args: StreamArgs) -> Result<ExitCode> {
    let mut client = Client::connect(addr)?;

    let mut read_error = None;
    let ack = client.stream(payloads(io::stdin().lock(), args.skip_empty, &mut read_error))?;
    if let Some(e) = read_error {
        return Err(e).context("Failed to read payloads from stdin");
    }

    println!("accepted {} rejected {}", ack.accepted, ack.rejected);
    Ok(if ack.rejected == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Lines of `reader`, pulled one at a time. Stops at the first read error and
/// parks it in `error`.
fn payloads<'a, R: BufRead + 'a>(
    reader: R,
    skip_empty: bool,
    error: &'a mut Option<io::Error>,
) -> impl Iterator<Item = String> + 'a {
    reader
        .lines()
        .map_while(move |line| line.map_err(|e| *error = Some(e)).ok())
        .filter(move |line| !(skip_empty && line.is_empty()))
}
